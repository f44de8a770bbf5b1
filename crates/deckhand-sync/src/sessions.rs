//! Per-account sync session tracking
//!
//! At most one sync pass runs per account at any time. Requests that arrive
//! while a pass is in flight are coalesced into a single queued re-run: the
//! running pass picks the request up when it finishes instead of a second
//! pass starting concurrently.

use std::sync::Arc;

use dashmap::DashMap;

use deckhand_core::domain::AccountId;

#[derive(Debug, Default)]
struct Session {
    running: bool,
    rerun: bool,
}

/// Tracks which accounts currently have a sync pass in flight
///
/// Cloning is cheap; all clones share the same session table.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<DashMap<AccountId, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tries to take the sync lease for an account
    ///
    /// Returns `None` when a pass is already running; the request is then
    /// recorded as a queued re-run. Any number of requests arriving while a
    /// pass runs collapse into a single re-run.
    pub fn begin(&self, account_id: AccountId) -> Option<SyncLease> {
        let mut session = self.sessions.entry(account_id).or_default();
        if session.running {
            session.rerun = true;
            return None;
        }
        session.running = true;
        session.rerun = false;
        Some(SyncLease {
            sessions: Arc::clone(&self.sessions),
            account_id,
        })
    }

    /// Whether a pass is currently running for the account
    pub fn is_running(&self, account_id: AccountId) -> bool {
        self.sessions
            .get(&account_id)
            .map_or(false, |s| s.running)
    }
}

/// Exclusive right to run sync passes for one account
///
/// Dropping the lease releases the account. A re-run requested while the
/// lease was held survives the drop and is picked up by the next `begin`.
#[derive(Debug)]
pub struct SyncLease {
    sessions: Arc<DashMap<AccountId, Session>>,
    account_id: AccountId,
}

impl SyncLease {
    /// Consumes the queued re-run request, if any
    pub fn take_rerun(&self) -> bool {
        self.sessions
            .get_mut(&self.account_id)
            .map_or(false, |mut s| std::mem::take(&mut s.rerun))
    }
}

impl Drop for SyncLease {
    fn drop(&mut self) {
        if let Some(mut session) = self.sessions.get_mut(&self.account_id) {
            session.running = false;
        }
    }
}
