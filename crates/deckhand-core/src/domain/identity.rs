//! Identity map entry model
//!
//! The identity map is the bidirectional mapping between local identifiers
//! and (account, remote identifier) pairs, plus the sync status of each
//! entity. There is exactly one entry per syncable entity: created at local
//! insert time, updated on every push/pull outcome, removed only when the
//! entity is gone both locally and remotely.
//!
//! The entry is derived state logically owned by the sync engine but
//! persisted by the local store, in the same transaction as the entity row,
//! so a crash mid-sync can never desynchronize the two.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entities::EntityKind;
use super::errors::DomainError;
use super::newtypes::{AccountId, Etag, LocalId, RemoteId};
use super::status::SyncStatus;

/// One identity map entry: (account, kind, local id) ↔ (remote id, etag, status)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityEntry {
    /// Owning account
    pub account_id: AccountId,
    /// Entity kind this entry belongs to
    pub kind: EntityKind,
    /// Process-local identity
    pub local_id: LocalId,
    /// Server-assigned identity, absent until the first successful push
    pub remote_id: Option<RemoteId>,
    /// Per-entity freshness token from the last reconciliation
    pub etag: Option<Etag>,
    /// Current sync status
    pub status: SyncStatus,
    /// When this entry last changed
    pub updated_at: DateTime<Utc>,
}

impl IdentityEntry {
    /// Creates the entry for a freshly inserted local entity
    ///
    /// A new local entity has no remote identity yet, so it starts `Dirty`;
    /// it can never be `Clean` before its first successful push.
    pub fn new_local(account_id: AccountId, kind: EntityKind, local_id: LocalId) -> Self {
        Self {
            account_id,
            kind,
            local_id,
            remote_id: None,
            etag: None,
            status: SyncStatus::Dirty,
            updated_at: Utc::now(),
        }
    }

    /// Creates the entry for an entity that arrived through a pull
    ///
    /// Pulled entities carry the server's canonical head and start `Clean`.
    pub fn new_remote(
        account_id: AccountId,
        kind: EntityKind,
        local_id: LocalId,
        remote_id: RemoteId,
        etag: Option<Etag>,
    ) -> Self {
        Self {
            account_id,
            kind,
            local_id,
            remote_id: Some(remote_id),
            etag,
            status: SyncStatus::Clean,
            updated_at: Utc::now(),
        }
    }

    /// Validates and applies a status transition
    ///
    /// # Errors
    /// Returns `DomainError::InvalidTransition` if the transition is not
    /// allowed by the status state machine.
    pub fn transition(&mut self, target: SyncStatus) -> Result<(), DomainError> {
        self.status = self.status.transition_to(target)?;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records a successful push or pull reconciliation
    ///
    /// This is the only operation that assigns a remote identifier, and the
    /// identifier must come from a successful gateway create/update response.
    pub fn record_synced(&mut self, remote_id: RemoteId, etag: Option<Etag>) -> Result<(), DomainError> {
        self.transition(SyncStatus::Clean)?;
        self.remote_id = Some(remote_id);
        self.etag = etag;
        Ok(())
    }

    /// Returns true if the entry violates the "no remote id is never Clean"
    /// invariant
    pub fn violates_identity_invariant(&self) -> bool {
        self.remote_id.is_none() && self.status == SyncStatus::Clean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_local_starts_dirty_without_remote_id() {
        let entry = IdentityEntry::new_local(AccountId::new(), EntityKind::Card, LocalId::new());
        assert_eq!(entry.status, SyncStatus::Dirty);
        assert!(entry.remote_id.is_none());
        assert!(!entry.violates_identity_invariant());
    }

    #[test]
    fn test_new_remote_starts_clean_with_remote_id() {
        let entry = IdentityEntry::new_remote(
            AccountId::new(),
            EntityKind::Board,
            LocalId::new(),
            RemoteId::new(7).unwrap(),
            Some(Etag::new("v1").unwrap()),
        );
        assert_eq!(entry.status, SyncStatus::Clean);
        assert!(!entry.violates_identity_invariant());
    }

    #[test]
    fn test_record_synced_assigns_remote_id() {
        let mut entry =
            IdentityEntry::new_local(AccountId::new(), EntityKind::Card, LocalId::new());
        entry.transition(SyncStatus::Pushing).unwrap();
        entry
            .record_synced(RemoteId::new(42).unwrap(), Some(Etag::new("v1").unwrap()))
            .unwrap();

        assert_eq!(entry.status, SyncStatus::Clean);
        assert_eq!(entry.remote_id.unwrap().as_i64(), 42);
        assert_eq!(entry.etag.as_ref().unwrap().as_str(), "v1");
    }

    #[test]
    fn test_record_synced_requires_pushing_state() {
        // Dirty -> Clean is not a legal transition; the entity must go
        // through Pushing first.
        let mut entry =
            IdentityEntry::new_local(AccountId::new(), EntityKind::Card, LocalId::new());
        let result = entry.record_synced(RemoteId::new(42).unwrap(), None);
        assert!(result.is_err());
        assert!(entry.remote_id.is_none());
    }

    #[test]
    fn test_invariant_detection() {
        let mut entry =
            IdentityEntry::new_local(AccountId::new(), EntityKind::Card, LocalId::new());
        // Force the broken state directly; transitions would never allow it.
        entry.status = SyncStatus::Clean;
        assert!(entry.violates_identity_invariant());
    }

    #[test]
    fn test_conflict_flow() {
        let mut entry =
            IdentityEntry::new_local(AccountId::new(), EntityKind::Card, LocalId::new());
        entry.transition(SyncStatus::Pushing).unwrap();
        entry.transition(SyncStatus::Conflicted).unwrap();
        assert!(entry.status.needs_attention());

        // keep-local resolution
        entry.transition(SyncStatus::Dirty).unwrap();
        assert_eq!(entry.status, SyncStatus::Dirty);
    }
}
