//! Change observation port (driving/primary port)
//!
//! Every committed store mutation is announced as a [`ChangeEvent`].
//! Observers subscribe with a [`ChangeScope`] and re-read whatever slice of
//! the store they care about; events carry identity, not payloads, so a slow
//! observer never holds stale data alive.
//!
//! Delivery is at-least-once per subscriber. A subscriber that falls behind
//! receives a single [`ChangeSignal::Resync`] instead of the dropped events
//! and is expected to re-read from scratch. The broadcast machinery lives in
//! the store adapter; this module only defines the vocabulary and the
//! subscription seam.

use async_trait::async_trait;

use crate::domain::{AccountId, EntityKind, LocalId, SyncStatus};

/// What happened to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// A new row was inserted
    Created,
    /// An existing row was rewritten
    Updated,
    /// The row was removed
    Removed,
    /// Only the sync status moved (push/pull bookkeeping)
    StatusChanged(SyncStatus),
}

/// One store mutation, identified but not carrying the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    /// An entity row changed
    Entity {
        /// Account the entity belongs to
        account_id: AccountId,
        /// Entity kind
        kind: EntityKind,
        /// Local id of the entity
        local_id: LocalId,
        /// What happened
        change: Change,
    },
    /// An account record changed (etag, last-sync, state)
    Account {
        /// The changed account
        account_id: AccountId,
    },
}

impl ChangeEvent {
    /// The account this event belongs to
    pub fn account_id(&self) -> AccountId {
        match self {
            ChangeEvent::Entity { account_id, .. } => *account_id,
            ChangeEvent::Account { account_id } => *account_id,
        }
    }
}

/// Subscription filter
///
/// Unset fields match everything; a scope with all fields unset observes
/// the whole store. Account events match on the account filter only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeScope {
    /// Only events for this account
    pub account_id: Option<AccountId>,
    /// Only entity events of this kind
    pub kind: Option<EntityKind>,
    /// Only entity events for this local id
    pub local_id: Option<LocalId>,
}

impl ChangeScope {
    /// Matches everything
    pub fn all() -> Self {
        Self::default()
    }

    /// Everything belonging to one account
    pub fn account(account_id: AccountId) -> Self {
        Self {
            account_id: Some(account_id),
            ..Self::default()
        }
    }

    /// One specific entity
    pub fn entity(account_id: AccountId, kind: EntityKind, local_id: LocalId) -> Self {
        Self {
            account_id: Some(account_id),
            kind: Some(kind),
            local_id: Some(local_id),
        }
    }

    /// Whether an event falls inside this scope
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if let Some(account) = self.account_id {
            if event.account_id() != account {
                return false;
            }
        }
        match event {
            ChangeEvent::Entity { kind, local_id, .. } => {
                self.kind.map_or(true, |k| k == *kind)
                    && self.local_id.map_or(true, |l| l == *local_id)
            }
            // Account events ignore the entity filters.
            ChangeEvent::Account { .. } => self.kind.is_none() && self.local_id.is_none(),
        }
    }
}

/// What a subscriber receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSignal {
    /// A single in-scope change
    Event(ChangeEvent),
    /// The subscriber lagged and lost events; re-read everything observed
    Resync,
}

/// One subscriber's view of the change feed
#[async_trait]
pub trait ChangeFeed: Send {
    /// Waits for the next in-scope signal
    ///
    /// Returns `None` once the feed's source is gone and all buffered
    /// events are consumed.
    async fn recv(&mut self) -> Option<ChangeSignal>;
}

/// Anything that can hand out scoped change subscriptions
pub trait Observable: Send + Sync {
    /// Opens a subscription filtered by the given scope
    ///
    /// The feed only sees events published after this call.
    fn subscribe(&self, scope: ChangeScope) -> Box<dyn ChangeFeed>;
}
