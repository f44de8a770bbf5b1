//! Change notification bus
//!
//! Implements the observation port from `deckhand-core` on a tokio
//! broadcast channel. Every successful store mutation publishes a
//! [`ChangeEvent`]; subscribers filter with a [`ChangeScope`] and re-read
//! whatever slice of the store they care about.
//!
//! When a subscriber falls behind the channel capacity it receives a single
//! [`ChangeSignal::Resync`] instead of the dropped events and is expected
//! to re-read from scratch.

use async_trait::async_trait;
use tokio::sync::broadcast;

use deckhand_core::ports::{ChangeEvent, ChangeFeed, ChangeScope, ChangeSignal};

/// Default broadcast channel capacity
const DEFAULT_CAPACITY: usize = 256;

/// Broadcast bus for store change events
///
/// Cloning is cheap; all clones publish into the same channel.
#[derive(Debug, Clone)]
pub struct ChangeBus {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeBus {
    /// Creates a bus with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a bus with an explicit channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event to all current subscribers
    ///
    /// Publishing with no subscribers is not an error; the event is simply
    /// dropped.
    pub fn publish(&self, event: ChangeEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!(?event, "Change event dropped (no subscribers)");
        }
    }

    /// Opens a subscription filtered by the given scope
    ///
    /// The stream only sees events published after this call.
    pub fn subscribe(&self, scope: ChangeScope) -> ChangeStream {
        ChangeStream {
            rx: self.tx.subscribe(),
            scope,
        }
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

/// One subscriber's view of the change bus
pub struct ChangeStream {
    rx: broadcast::Receiver<ChangeEvent>,
    scope: ChangeScope,
}

impl ChangeStream {
    /// Waits for the next in-scope signal
    ///
    /// Returns `None` once the bus has been dropped and all buffered events
    /// are consumed. A lag is collapsed into a single `Resync` signal, even
    /// when the dropped events would all have been out of scope (the
    /// subscriber cannot know, so it must re-read).
    pub async fn next(&mut self) -> Option<ChangeSignal> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.scope.matches(&event) => {
                    return Some(ChangeSignal::Event(event));
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Change stream lagged; signalling resync");
                    return Some(ChangeSignal::Resync);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking poll for the next in-scope signal
    pub fn try_next(&mut self) -> Option<ChangeSignal> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.scope.matches(&event) => {
                    return Some(ChangeSignal::Event(event));
                }
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Change stream lagged; signalling resync");
                    return Some(ChangeSignal::Resync);
                }
                Err(_) => return None,
            }
        }
    }
}

#[async_trait]
impl ChangeFeed for ChangeStream {
    async fn recv(&mut self) -> Option<ChangeSignal> {
        self.next().await
    }
}
