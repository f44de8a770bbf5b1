//! Local store ports (driven/secondary ports)
//!
//! These traits define the persistence boundary: entity rows, identity map
//! entries, and account records. Implementations live in the store adapter
//! crate and are backed by SQLite.
//!
//! ## Design Notes
//!
//! - One generic [`EntityStore`] trait parameterized over the entity type
//!   replaces a per-entity repository zoo; the entity type carries its own
//!   table identity through [`Syncable::KIND`].
//! - Identity map mutations are separate from entity writes at the trait
//!   level, but implementations must persist an entity row and its identity
//!   entry in the same transaction when both change.
//! - All write operations take references to domain entities, allowing the
//!   caller to retain ownership.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{
    Account, AccountId, EntityKind, Etag, IdentityEntry, LocalId, RemoteId, SyncStatus, Syncable,
};

// ============================================================================
// Store errors
// ============================================================================

/// Errors surfaced by store adapters
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested row does not exist
    #[error("Not found: {kind} {id}")]
    NotFound {
        /// Entity kind that was looked up
        kind: &'static str,
        /// Identifier that missed
        id: String,
    },

    /// An identity map transition was rejected by the status state machine
    #[error("Domain rule violated: {0}")]
    Domain(#[from] crate::domain::DomainError),

    /// Underlying database failure
    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),
}

impl StoreError {
    /// Convenience constructor for a missing row of a syncable kind
    pub fn not_found(kind: EntityKind, id: impl ToString) -> Self {
        StoreError::NotFound {
            kind: kind.as_str(),
            id: id.to_string(),
        }
    }
}

// ============================================================================
// EntityStore trait
// ============================================================================

/// Generic persistence port for one syncable entity kind
///
/// Implemented once per entity type by the store adapter. Saving is an
/// upsert keyed on the entity's local id.
#[async_trait]
pub trait EntityStore<E: Syncable>: Send + Sync {
    /// Inserts or updates an entity row
    async fn save(&self, entity: &E) -> Result<(), StoreError>;

    /// Inserts or updates an entity row together with its identity entry
    ///
    /// Both writes happen in one transaction so a crash can never leave an
    /// entity without its identity entry (or the other way around).
    async fn save_with_entry(&self, entity: &E, entry: &IdentityEntry) -> Result<(), StoreError>;

    /// Retrieves an entity by its local id
    async fn get(&self, account_id: AccountId, local_id: LocalId)
        -> Result<Option<E>, StoreError>;

    /// Lists entities under a parent (or all roots when the kind has no parent)
    ///
    /// For boards, `parent` is ignored and all boards of the account are
    /// returned. For every other kind, `parent` is the owning entity's
    /// local id.
    async fn list_children(
        &self,
        account_id: AccountId,
        parent: Option<LocalId>,
    ) -> Result<Vec<E>, StoreError>;

    /// Removes an entity row
    ///
    /// Missing rows are not an error; removal is idempotent.
    async fn remove(&self, account_id: AccountId, local_id: LocalId) -> Result<(), StoreError>;
}

// ============================================================================
// IdentityMap trait
// ============================================================================

/// Port for the local↔remote identity mapping and per-entity sync status
///
/// The `mark_*` family applies status transitions through the domain state
/// machine; an illegal transition surfaces as `StoreError::Domain` and
/// leaves the stored entry untouched.
#[async_trait]
pub trait IdentityMap: Send + Sync {
    /// Inserts or replaces an identity entry
    ///
    /// Keyed on `(account_id, kind, local_id)`. Conflict resolution rewrites
    /// entries through this rather than the `mark_*` transitions.
    async fn insert(&self, entry: &IdentityEntry) -> Result<(), StoreError>;

    /// Looks up an entry by local id
    async fn entry(
        &self,
        account_id: AccountId,
        kind: EntityKind,
        local_id: LocalId,
    ) -> Result<Option<IdentityEntry>, StoreError>;

    /// Looks up an entry by remote id
    async fn resolve_remote(
        &self,
        account_id: AccountId,
        kind: EntityKind,
        remote_id: RemoteId,
    ) -> Result<Option<IdentityEntry>, StoreError>;

    /// Marks an entity as locally edited
    async fn mark_dirty(
        &self,
        account_id: AccountId,
        kind: EntityKind,
        local_id: LocalId,
    ) -> Result<(), StoreError>;

    /// Marks a push as in flight for an entity
    async fn mark_pushing(
        &self,
        account_id: AccountId,
        kind: EntityKind,
        local_id: LocalId,
    ) -> Result<(), StoreError>;

    /// Records a successful push/pull reconciliation
    ///
    /// Assigns the remote id and etag and transitions the entry to `Clean`.
    async fn mark_synced(
        &self,
        account_id: AccountId,
        kind: EntityKind,
        local_id: LocalId,
        remote_id: RemoteId,
        etag: Option<Etag>,
    ) -> Result<(), StoreError>;

    /// Marks an entity as conflicted after an etag mismatch
    async fn mark_conflicted(
        &self,
        account_id: AccountId,
        kind: EntityKind,
        local_id: LocalId,
    ) -> Result<(), StoreError>;

    /// Tombstones an entity pending remote delete
    async fn mark_deleted(
        &self,
        account_id: AccountId,
        kind: EntityKind,
        local_id: LocalId,
    ) -> Result<(), StoreError>;

    /// Removes an entry once the entity is gone both locally and remotely
    async fn remove(
        &self,
        account_id: AccountId,
        kind: EntityKind,
        local_id: LocalId,
    ) -> Result<(), StoreError>;

    /// Lists entries of one kind in a given status, oldest update first
    ///
    /// The push pass drains `Dirty` and `Deleted` entries through this.
    async fn entries_in_status(
        &self,
        account_id: AccountId,
        kind: EntityKind,
        status: SyncStatus,
    ) -> Result<Vec<IdentityEntry>, StoreError>;

    /// Lists every known remote id of one kind for an account
    ///
    /// The pull pass diffs this set against the server listing to detect
    /// remote deletions.
    async fn known_remote_ids(
        &self,
        account_id: AccountId,
        kind: EntityKind,
    ) -> Result<Vec<(LocalId, RemoteId)>, StoreError>;
}

// ============================================================================
// AccountStore trait
// ============================================================================

/// Port for account persistence
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Saves an account (insert or update)
    async fn save_account(&self, account: &Account) -> Result<(), StoreError>;

    /// Retrieves an account by its id
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Lists all configured accounts
    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError>;

    /// Removes an account and all rows belonging to it
    async fn remove_account(&self, id: AccountId) -> Result<(), StoreError>;
}

// ============================================================================
// CardLinks trait
// ============================================================================

/// Port for the card↔label and card↔user assignment junctions
///
/// Assignments are local-state only from the store's perspective; the sync
/// engine reconciles them as part of the owning card's payload.
#[async_trait]
pub trait CardLinks: Send + Sync {
    /// Assigns a label to a card
    async fn link_label(
        &self,
        account_id: AccountId,
        card: LocalId,
        label: LocalId,
    ) -> Result<(), StoreError>;

    /// Removes a label assignment
    async fn unlink_label(
        &self,
        account_id: AccountId,
        card: LocalId,
        label: LocalId,
    ) -> Result<(), StoreError>;

    /// Lists the labels assigned to a card
    async fn labels_for_card(
        &self,
        account_id: AccountId,
        card: LocalId,
    ) -> Result<Vec<LocalId>, StoreError>;

    /// Assigns a user to a card
    async fn link_user(
        &self,
        account_id: AccountId,
        card: LocalId,
        user: LocalId,
    ) -> Result<(), StoreError>;

    /// Removes a user assignment
    async fn unlink_user(
        &self,
        account_id: AccountId,
        card: LocalId,
        user: LocalId,
    ) -> Result<(), StoreError>;

    /// Lists the users assigned to a card
    async fn users_for_card(
        &self,
        account_id: AccountId,
        card: LocalId,
    ) -> Result<Vec<LocalId>, StoreError>;
}
