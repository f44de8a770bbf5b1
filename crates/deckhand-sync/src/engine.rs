//! The sync engine
//!
//! [`SyncEngine`] is the application-facing facade: local mutations, reads,
//! change watches, and sync passes all go through it. It is generic over the
//! store and gateway ports so tests can swap either side out.
//!
//! A sync pass runs in two phases:
//!
//! 1. **Push** - drain tombstoned and dirty entities kind by kind, parents
//!    before children so freshly created parents resolve for their children
//!    within the same pass.
//! 2. **Pull** - probe the account head, then walk the remote tree top-down,
//!    merging records into clean local rows and purging rows whose remote
//!    counterpart disappeared.
//!
//! Per-entity failures are recorded in the pass summary and do not stop the
//! pass; a credential rejection aborts the pass and flags the account.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use deckhand_core::config::Config;
use deckhand_core::domain::{
    Account, AccountId, Attachment, Board, Card, CardAggregate, Comment, EntityKind, IdentityEntry,
    Label, LocalId, RemoteId, Stack, SyncStatus, Syncable, User,
};
use deckhand_core::ports::{
    AccountGateway, AccountProbe, AccountStore, CardLinks, ChangeEvent, ChangeFeed, ChangeScope,
    ChangeSignal, EntityGateway, EntityStore, GatewayError, IdentityMap, Observable, StoreError,
};

use crate::assembler;
use crate::sessions::{SessionRegistry, SyncLease};
use crate::SyncError;

// ============================================================================
// Port bundles
// ============================================================================

/// Everything the engine needs from the local store
///
/// Blanket-implemented for any type that covers all entity kinds plus the
/// identity map, accounts, card links, and change observation.
pub trait SyncStore:
    EntityStore<Board>
    + EntityStore<Label>
    + EntityStore<Stack>
    + EntityStore<Card>
    + EntityStore<User>
    + EntityStore<Comment>
    + EntityStore<Attachment>
    + IdentityMap
    + AccountStore
    + CardLinks
    + Observable
    + Send
    + Sync
    + 'static
{
}

impl<T> SyncStore for T where
    T: EntityStore<Board>
        + EntityStore<Label>
        + EntityStore<Stack>
        + EntityStore<Card>
        + EntityStore<User>
        + EntityStore<Comment>
        + EntityStore<Attachment>
        + IdentityMap
        + AccountStore
        + CardLinks
        + Observable
        + Send
        + Sync
        + 'static
{
}

/// Everything the engine needs from the remote gateway
///
/// Users are absent on purpose: they are pull-only and flow through
/// [`AccountGateway::fetch_users`].
pub trait SyncGateway:
    EntityGateway<Board>
    + EntityGateway<Label>
    + EntityGateway<Stack>
    + EntityGateway<Card>
    + EntityGateway<Comment>
    + EntityGateway<Attachment>
    + AccountGateway
    + Send
    + Sync
    + 'static
{
}

impl<T> SyncGateway for T where
    T: EntityGateway<Board>
        + EntityGateway<Label>
        + EntityGateway<Stack>
        + EntityGateway<Card>
        + EntityGateway<Comment>
        + EntityGateway<Attachment>
        + AccountGateway
        + Send
        + Sync
        + 'static
{
}

/// Builds a gateway bound to one account's server and credentials
pub trait GatewayFactory: Send + Sync + 'static {
    /// The gateway type produced for each account
    type Gateway: SyncGateway;

    /// Constructs a gateway for the given account
    fn gateway(&self, account: &Account) -> Result<Self::Gateway, SyncError>;
}

// ============================================================================
// Settings and summaries
// ============================================================================

/// What to do automatically when a push hits an etag conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Leave the entity `Conflicted` until someone resolves it
    #[default]
    Manual,
    /// Re-queue the local version for an unconditional overwrite
    KeepLocal,
    /// Discard local edits and adopt the server version
    AcceptRemote,
}

impl ConflictPolicy {
    /// Parses the configuration string form; unknown values fall back to
    /// `Manual`, the only policy that never loses data on its own.
    pub fn parse(s: &str) -> Self {
        match s {
            "keep_local" => ConflictPolicy::KeepLocal,
            "accept_remote" => ConflictPolicy::AcceptRemote,
            _ => ConflictPolicy::Manual,
        }
    }
}

/// How to resolve one specific conflicted entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Push the local version, overwriting the server head
    KeepLocal,
    /// Fetch the server version and overwrite local edits
    AcceptRemote,
}

/// Tunable engine behavior
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Maximum attempts per remote request
    pub max_retries: u32,
    /// Base delay for exponential retry backoff
    pub retry_base_delay: Duration,
    /// Automatic conflict handling
    pub conflict_policy: ConflictPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_base_delay: Duration::from_millis(1000),
            conflict_policy: ConflictPolicy::Manual,
        }
    }
}

impl EngineSettings {
    /// Derives engine settings from the loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_retries: config.sync.max_retries,
            retry_base_delay: Duration::from_millis(config.sync.retry_base_delay_ms),
            conflict_policy: ConflictPolicy::parse(&config.conflicts.policy),
        }
    }
}

/// Outcome of one sync pass (or a run of coalesced passes)
#[derive(Debug, Clone, Default)]
pub struct SyncSummary {
    /// Entities pushed to the server (creates and updates)
    pub pushed: u32,
    /// Entities merged from the server (inserts and updates)
    pub pulled: u32,
    /// Entities deleted, on either side
    pub deleted: u32,
    /// Entities left in `Conflicted` by this pass
    pub conflicts: Vec<(EntityKind, LocalId)>,
    /// Per-entity failures that did not stop the pass
    pub errors: Vec<String>,
    /// Wall-clock duration of the pass
    pub duration_ms: u64,
}

impl SyncSummary {
    /// Folds another pass's counters into this one
    pub fn merge(&mut self, other: SyncSummary) {
        self.pushed += other.pushed;
        self.pulled += other.pulled;
        self.deleted += other.deleted;
        self.conflicts.extend(other.conflicts);
        self.errors.extend(other.errors);
        self.duration_ms += other.duration_ms;
    }

    /// True when the pass finished without recording any failure
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.conflicts.is_empty()
    }
}

// ============================================================================
// Engine
// ============================================================================

struct EngineInner<S, F> {
    store: S,
    gateways: F,
    sessions: SessionRegistry,
    settings: EngineSettings,
}

/// Facade over the store and gateway ports
///
/// Cheap to clone; all clones share the same store, gateway factory, and
/// session registry.
pub struct SyncEngine<S, F> {
    inner: Arc<EngineInner<S, F>>,
}

impl<S, F> Clone for SyncEngine<S, F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Where a pushable entity's parent currently stands
enum ParentRemote {
    /// The kind has no parent
    Root,
    /// The parent is known to the server under this id
    Resolved(RemoteId),
    /// The parent has no remote id yet (or its mapping is gone)
    Unresolved,
}

/// What happened to one dirty entity during push
enum PushOutcome {
    Synced,
    Conflicted,
    Skipped,
}

impl<S, F> SyncEngine<S, F>
where
    S: SyncStore,
    F: GatewayFactory,
{
    pub fn new(store: S, gateways: F, settings: EngineSettings) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                gateways,
                sessions: SessionRegistry::new(),
                settings,
            }),
        }
    }

    /// Direct access to the underlying store
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    // ------------------------------------------------------------------
    // Account facade
    // ------------------------------------------------------------------

    pub async fn add_account(&self, account: &Account) -> Result<(), SyncError> {
        self.inner.store.save_account(account).await?;
        Ok(())
    }

    pub async fn read_account(&self, id: AccountId) -> Result<Account, SyncError> {
        self.inner
            .store
            .get_account(id)
            .await?
            .ok_or(SyncError::AccountNotFound(id))
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, SyncError> {
        Ok(self.inner.store.list_accounts().await?)
    }

    /// Removes an account and every local row belonging to it
    pub async fn remove_account(&self, id: AccountId) -> Result<(), SyncError> {
        self.inner.store.remove_account(id).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Entity facade
    // ------------------------------------------------------------------

    /// Records a locally created entity
    ///
    /// The entity starts `Dirty` with no remote id and is pushed on the next
    /// pass. Server-owned kinds (users) cannot be created locally.
    pub async fn create_entity<E>(&self, entity: &E) -> Result<(), SyncError>
    where
        E: Syncable,
        S: EntityStore<E>,
    {
        if !E::KIND.is_pushable() {
            return Err(SyncError::Domain(
                deckhand_core::domain::DomainError::ValidationFailed(format!(
                    "{} records are server-owned and cannot be created locally",
                    E::KIND.as_str()
                )),
            ));
        }
        let entry = IdentityEntry::new_local(entity.account_id(), E::KIND, entity.local_id());
        EntityStore::<E>::save_with_entry(&self.inner.store, entity, &entry).await?;
        Ok(())
    }

    /// Records a local edit to an existing entity
    pub async fn update_entity<E>(&self, entity: &E) -> Result<(), SyncError>
    where
        E: Syncable,
        S: EntityStore<E>,
    {
        let store = &self.inner.store;
        let mut entry = store
            .entry(entity.account_id(), E::KIND, entity.local_id())
            .await?
            .ok_or_else(|| StoreError::not_found(E::KIND, entity.local_id()))?;

        if entry.status != SyncStatus::Dirty {
            entry.transition(SyncStatus::Dirty)?;
        } else {
            entry.updated_at = Utc::now();
        }
        EntityStore::<E>::save_with_entry(store, entity, &entry).await?;
        Ok(())
    }

    /// Records a local delete
    ///
    /// Entities that were never pushed vanish immediately; everything else
    /// is tombstoned and deleted remotely on the next pass.
    pub async fn delete_entity<E>(
        &self,
        account_id: AccountId,
        local_id: LocalId,
    ) -> Result<(), SyncError>
    where
        E: Syncable,
        S: EntityStore<E>,
    {
        let store = &self.inner.store;
        let entry = store
            .entry(account_id, E::KIND, local_id)
            .await?
            .ok_or_else(|| StoreError::not_found(E::KIND, local_id))?;

        if entry.remote_id.is_none() {
            EntityStore::<E>::remove(store, account_id, local_id).await?;
            IdentityMap::remove(store, account_id, E::KIND, local_id).await?;
        } else {
            store.mark_deleted(account_id, E::KIND, local_id).await?;
        }
        Ok(())
    }

    /// Assigns a label to a card and queues the card for push
    pub async fn assign_label(
        &self,
        account_id: AccountId,
        card: LocalId,
        label: LocalId,
    ) -> Result<(), SyncError> {
        let store = &self.inner.store;
        store.link_label(account_id, card, label).await?;
        store.mark_dirty(account_id, EntityKind::Card, card).await?;
        Ok(())
    }

    /// Removes a label assignment and queues the card for push
    pub async fn unassign_label(
        &self,
        account_id: AccountId,
        card: LocalId,
        label: LocalId,
    ) -> Result<(), SyncError> {
        let store = &self.inner.store;
        store.unlink_label(account_id, card, label).await?;
        store.mark_dirty(account_id, EntityKind::Card, card).await?;
        Ok(())
    }

    /// Assigns a user to a card and queues the card for push
    pub async fn assign_user(
        &self,
        account_id: AccountId,
        card: LocalId,
        user: LocalId,
    ) -> Result<(), SyncError> {
        let store = &self.inner.store;
        store.link_user(account_id, card, user).await?;
        store.mark_dirty(account_id, EntityKind::Card, card).await?;
        Ok(())
    }

    /// Removes a user assignment and queues the card for push
    pub async fn unassign_user(
        &self,
        account_id: AccountId,
        card: LocalId,
        user: LocalId,
    ) -> Result<(), SyncError> {
        let store = &self.inner.store;
        store.unlink_user(account_id, card, user).await?;
        store.mark_dirty(account_id, EntityKind::Card, card).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads and watches
    // ------------------------------------------------------------------

    /// Loads a card with its labels, assignees, comments, and attachments
    pub async fn get_aggregate(
        &self,
        account_id: AccountId,
        card: LocalId,
    ) -> Result<CardAggregate, SyncError> {
        assembler::assemble(&self.inner.store, account_id, card).await
    }

    /// Opens a live view of one card aggregate
    ///
    /// The first `next()` yields the current snapshot; afterwards every
    /// store change in the account triggers a re-read. The scope is
    /// deliberately account-wide because label, user, comment, and
    /// attachment changes all affect the aggregate.
    pub fn watch_aggregate(&self, account_id: AccountId, card: LocalId) -> AggregateWatch<S, F> {
        AggregateWatch {
            engine: self.clone(),
            feed: self.inner.store.subscribe(ChangeScope::account(account_id)),
            account_id,
            card,
            primed: true,
        }
    }

    /// Opens a live view of one account record
    pub fn watch_account(&self, account_id: AccountId) -> AccountWatch<S, F> {
        AccountWatch {
            engine: self.clone(),
            feed: self.inner.store.subscribe(ChangeScope::account(account_id)),
            account_id,
            primed: true,
        }
    }

    // ------------------------------------------------------------------
    // Sync entry points
    // ------------------------------------------------------------------

    /// Requests a sync pass without waiting for it
    ///
    /// If a pass is already running for the account, the request coalesces
    /// into a single queued re-run.
    pub fn trigger_sync(&self, account_id: AccountId) {
        let Some(lease) = self.inner.sessions.begin(account_id) else {
            debug!(%account_id, "Sync already in flight; request coalesced");
            return;
        };
        let engine = self.clone();
        tokio::spawn(async move {
            engine.run_leased(account_id, lease).await;
        });
    }

    /// Runs sync passes until no re-run is queued, returning the combined
    /// summary
    ///
    /// Returns an empty summary when another pass already holds the lease;
    /// that pass will pick the request up as a re-run.
    pub async fn sync_now(&self, account_id: AccountId) -> Result<SyncSummary, SyncError> {
        let Some(lease) = self.inner.sessions.begin(account_id) else {
            debug!(%account_id, "Sync already in flight; request coalesced");
            return Ok(SyncSummary::default());
        };

        let mut total = SyncSummary::default();
        loop {
            total.merge(self.run_pass(account_id).await?);
            if !lease.take_rerun() {
                break;
            }
            debug!(%account_id, "Re-running queued sync pass");
        }
        drop(lease);
        Ok(total)
    }

    async fn run_leased(&self, account_id: AccountId, lease: SyncLease) {
        loop {
            match self.run_pass(account_id).await {
                Ok(summary) => info!(
                    %account_id,
                    pushed = summary.pushed,
                    pulled = summary.pulled,
                    deleted = summary.deleted,
                    conflicts = summary.conflicts.len(),
                    errors = summary.errors.len(),
                    duration_ms = summary.duration_ms,
                    "Sync pass finished"
                ),
                Err(err) => warn!(%account_id, error = %err, "Sync pass failed"),
            }
            if !lease.take_rerun() {
                break;
            }
            debug!(%account_id, "Re-running queued sync pass");
        }
    }

    /// One push-then-pull pass for a single account
    #[tracing::instrument(skip(self))]
    async fn run_pass(&self, account_id: AccountId) -> Result<SyncSummary, SyncError> {
        let start = Instant::now();
        let mut summary = SyncSummary::default();
        let mut account = self.read_account(account_id).await?;

        if !account.state().can_sync() {
            debug!(%account_id, state = ?account.state(), "Account cannot sync; skipping pass");
            summary
                .errors
                .push(format!("account {account_id} is not syncable"));
            return Ok(summary);
        }

        let gateway = self.inner.gateways.gateway(&account)?;

        match self.push_account(&gateway, account_id, &mut summary).await {
            Ok(()) => {}
            Err(err) if err.is_authentication() => {
                return self.abort_unauthorized(account, summary, start).await;
            }
            Err(err) => return Err(err),
        }

        match self
            .pull_account(&gateway, &mut account, &mut summary)
            .await
        {
            Ok(()) => {}
            Err(err) if err.is_authentication() => {
                return self.abort_unauthorized(account, summary, start).await;
            }
            Err(err) => return Err(err),
        }

        account.record_sync(Utc::now());
        self.inner.store.save_account(&account).await?;

        summary.duration_ms = start.elapsed().as_millis() as u64;
        Ok(summary)
    }

    /// Flags the account and ends the pass after a credential rejection
    async fn abort_unauthorized(
        &self,
        mut account: Account,
        mut summary: SyncSummary,
        start: Instant,
    ) -> Result<SyncSummary, SyncError> {
        warn!(account_id = %account.id(), "Credentials rejected; account flagged for re-authentication");
        account.require_authentication();
        self.inner.store.save_account(&account).await?;
        summary.errors.push("authentication required".to_string());
        summary.duration_ms = start.elapsed().as_millis() as u64;
        Ok(summary)
    }

    // ------------------------------------------------------------------
    // Push phase
    // ------------------------------------------------------------------

    async fn push_account(
        &self,
        gateway: &F::Gateway,
        account_id: AccountId,
        summary: &mut SyncSummary,
    ) -> Result<(), SyncError> {
        // Parents before children: a card cannot be created remotely until
        // its stack has a remote id.
        self.push_kind::<Board>(gateway, account_id, summary).await?;
        self.push_kind::<Label>(gateway, account_id, summary).await?;
        self.push_kind::<Stack>(gateway, account_id, summary).await?;
        self.push_kind::<Card>(gateway, account_id, summary).await?;
        self.push_kind::<Comment>(gateway, account_id, summary)
            .await?;
        self.push_kind::<Attachment>(gateway, account_id, summary)
            .await?;
        Ok(())
    }

    async fn push_kind<E>(
        &self,
        gateway: &F::Gateway,
        account_id: AccountId,
        summary: &mut SyncSummary,
    ) -> Result<(), SyncError>
    where
        E: Syncable,
        S: EntityStore<E>,
        F::Gateway: EntityGateway<E>,
    {
        let store = &self.inner.store;

        // Tombstones first so a delete-and-recreate of the same object does
        // not race its own replacement.
        for entry in store
            .entries_in_status(account_id, E::KIND, SyncStatus::Deleted)
            .await?
        {
            let local_id = entry.local_id;
            match self.push_delete::<E>(gateway, account_id, entry).await {
                Ok(()) => summary.deleted += 1,
                Err(err) if err.is_authentication() => return Err(err),
                Err(err) => {
                    warn!(kind = E::KIND.as_str(), %local_id, error = %err, "Delete push failed");
                    summary
                        .errors
                        .push(format!("delete {} {}: {}", E::KIND.as_str(), local_id, err));
                }
            }
        }

        for entry in store
            .entries_in_status(account_id, E::KIND, SyncStatus::Dirty)
            .await?
        {
            let local_id = entry.local_id;
            match self.push_one::<E>(gateway, account_id, entry).await {
                Ok(PushOutcome::Synced) => summary.pushed += 1,
                Ok(PushOutcome::Conflicted) => summary.conflicts.push((E::KIND, local_id)),
                Ok(PushOutcome::Skipped) => {}
                Err(err) if err.is_authentication() => return Err(err),
                Err(err) => {
                    warn!(kind = E::KIND.as_str(), %local_id, error = %err, "Push failed");
                    summary
                        .errors
                        .push(format!("push {} {}: {}", E::KIND.as_str(), local_id, err));
                }
            }
        }

        Ok(())
    }

    /// Reconciles one tombstone, then purges it locally
    async fn push_delete<E>(
        &self,
        gateway: &F::Gateway,
        account_id: AccountId,
        entry: IdentityEntry,
    ) -> Result<(), SyncError>
    where
        E: Syncable,
        S: EntityStore<E>,
        F::Gateway: EntityGateway<E>,
    {
        let store = &self.inner.store;

        if let Some(remote_id) = entry.remote_id {
            let parent = match EntityStore::<E>::get(store, account_id, entry.local_id).await? {
                Some(entity) => self.parent_remote(&entity).await?,
                None => ParentRemote::Unresolved,
            };
            match parent {
                ParentRemote::Root => {
                    self.delete_remote::<E>(gateway, None, remote_id).await?;
                }
                ParentRemote::Resolved(parent_id) => {
                    self.delete_remote::<E>(gateway, Some(parent_id), remote_id)
                        .await?;
                }
                // The parent mapping is gone, which only happens when the
                // parent itself was deleted; the server cascades child
                // deletes, so there is nothing left to address.
                ParentRemote::Unresolved => {
                    debug!(
                        kind = E::KIND.as_str(),
                        local_id = %entry.local_id,
                        "Parent gone; treating delete as cascaded"
                    );
                }
            }
        }

        EntityStore::<E>::remove(store, account_id, entry.local_id).await?;
        IdentityMap::remove(store, account_id, E::KIND, entry.local_id).await?;
        Ok(())
    }

    async fn delete_remote<E>(
        &self,
        gateway: &F::Gateway,
        parent: Option<RemoteId>,
        remote_id: RemoteId,
    ) -> Result<(), SyncError>
    where
        E: Syncable,
        F::Gateway: EntityGateway<E>,
    {
        match self
            .with_retry("delete", || {
                EntityGateway::<E>::delete(gateway, parent, remote_id)
            })
            .await
        {
            Ok(()) => Ok(()),
            // Already gone remotely: the goal state holds.
            Err(GatewayError::NotFound(_)) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Pushes one dirty entity
    async fn push_one<E>(
        &self,
        gateway: &F::Gateway,
        account_id: AccountId,
        entry: IdentityEntry,
    ) -> Result<PushOutcome, SyncError>
    where
        E: Syncable,
        S: EntityStore<E>,
        F::Gateway: EntityGateway<E>,
    {
        let store = &self.inner.store;

        let Some(entity) = EntityStore::<E>::get(store, account_id, entry.local_id).await? else {
            // Identity entry without a row: drop the orphan.
            IdentityMap::remove(store, account_id, E::KIND, entry.local_id).await?;
            return Ok(PushOutcome::Skipped);
        };

        let parent = match self.parent_remote(&entity).await? {
            ParentRemote::Root => None,
            ParentRemote::Resolved(remote_id) => Some(remote_id),
            ParentRemote::Unresolved => {
                // The parent failed to push this pass; the entity stays
                // dirty and is retried next pass.
                debug!(
                    kind = E::KIND.as_str(),
                    local_id = %entry.local_id,
                    "Parent has no remote id yet; deferring push"
                );
                return Ok(PushOutcome::Skipped);
            }
        };

        store
            .mark_pushing(account_id, E::KIND, entry.local_id)
            .await?;

        let result = match entry.remote_id {
            None => {
                self.with_retry("create", || {
                    EntityGateway::<E>::create(gateway, parent, &entity)
                })
                .await
            }
            Some(remote_id) => {
                match self
                    .with_retry("update", || {
                        EntityGateway::<E>::update(
                            gateway,
                            parent,
                            remote_id,
                            entry.etag.as_ref(),
                            &entity,
                        )
                    })
                    .await
                {
                    // The server lost the object; recreate it under the same
                    // local identity.
                    Err(GatewayError::NotFound(_)) => {
                        debug!(
                            kind = E::KIND.as_str(),
                            %remote_id,
                            "Remote object vanished; recreating"
                        );
                        self.with_retry("create", || {
                            EntityGateway::<E>::create(gateway, parent, &entity)
                        })
                        .await
                    }
                    other => other,
                }
            }
        };

        match result {
            Ok(head) => {
                store
                    .mark_synced(account_id, E::KIND, entry.local_id, head.remote_id, head.etag)
                    .await?;
                Ok(PushOutcome::Synced)
            }
            Err(GatewayError::Conflict { remote_id, .. }) => {
                warn!(
                    kind = E::KIND.as_str(),
                    local_id = %entry.local_id,
                    %remote_id,
                    "Remote head moved; entity conflicted"
                );
                store
                    .mark_conflicted(account_id, E::KIND, entry.local_id)
                    .await?;
                match self.inner.settings.conflict_policy {
                    ConflictPolicy::Manual => {}
                    ConflictPolicy::KeepLocal => {
                        self.keep_local::<E>(account_id, entry.local_id).await?;
                    }
                    ConflictPolicy::AcceptRemote => {
                        self.accept_remote::<E>(gateway, account_id, entry.local_id)
                            .await?;
                    }
                }
                Ok(PushOutcome::Conflicted)
            }
            Err(err) => {
                // Put the entity back in the queue before surfacing the
                // failure; a crash mid-push must not strand it in `Pushing`.
                store
                    .mark_dirty(account_id, E::KIND, entry.local_id)
                    .await?;
                Err(err.into())
            }
        }
    }

    /// Resolves the remote id of an entity's parent through the identity map
    async fn parent_remote<E>(&self, entity: &E) -> Result<ParentRemote, SyncError>
    where
        E: Syncable,
    {
        let Some(parent_kind) = E::KIND.parent_kind() else {
            return Ok(ParentRemote::Root);
        };
        let Some(parent_local) = entity.parent_local_id() else {
            return Ok(ParentRemote::Unresolved);
        };
        let entry = self
            .inner
            .store
            .entry(entity.account_id(), parent_kind, parent_local)
            .await?;
        Ok(match entry.and_then(|e| e.remote_id) {
            Some(remote_id) => ParentRemote::Resolved(remote_id),
            None => ParentRemote::Unresolved,
        })
    }

    // ------------------------------------------------------------------
    // Conflict resolution
    // ------------------------------------------------------------------

    /// Resolves one conflicted entity
    ///
    /// `KeepLocal` re-queues the local version for an unconditional push;
    /// `AcceptRemote` fetches the server version and overwrites local edits.
    pub async fn resolve_conflict<E>(
        &self,
        account_id: AccountId,
        local_id: LocalId,
        resolution: ConflictResolution,
    ) -> Result<(), SyncError>
    where
        E: Syncable,
        S: EntityStore<E>,
        F::Gateway: EntityGateway<E>,
    {
        let entry = self
            .inner
            .store
            .entry(account_id, E::KIND, local_id)
            .await?
            .ok_or_else(|| StoreError::not_found(E::KIND, local_id))?;
        if entry.status != SyncStatus::Conflicted {
            return Err(SyncError::Domain(
                deckhand_core::domain::DomainError::ValidationFailed(format!(
                    "{} {} is not conflicted",
                    E::KIND.as_str(),
                    local_id
                )),
            ));
        }

        match resolution {
            ConflictResolution::KeepLocal => self.keep_local::<E>(account_id, local_id).await,
            ConflictResolution::AcceptRemote => {
                let account = self.read_account(account_id).await?;
                let gateway = self.inner.gateways.gateway(&account)?;
                self.accept_remote::<E>(&gateway, account_id, local_id).await
            }
        }
    }

    /// Clears the etag and re-queues the local version for push
    ///
    /// The next push sends no `If-Match`, so the local version overwrites
    /// whatever the server head became.
    async fn keep_local<E>(&self, account_id: AccountId, local_id: LocalId) -> Result<(), SyncError>
    where
        E: Syncable,
    {
        let store = &self.inner.store;
        let mut entry = store
            .entry(account_id, E::KIND, local_id)
            .await?
            .ok_or_else(|| StoreError::not_found(E::KIND, local_id))?;
        entry.transition(SyncStatus::Dirty)?;
        entry.etag = None;
        store.insert(&entry).await?;
        Ok(())
    }

    /// Fetches the server version and overwrites local edits with it
    async fn accept_remote<E>(
        &self,
        gateway: &F::Gateway,
        account_id: AccountId,
        local_id: LocalId,
    ) -> Result<(), SyncError>
    where
        E: Syncable,
        S: EntityStore<E>,
        F::Gateway: EntityGateway<E>,
    {
        let store = &self.inner.store;
        let entry = store
            .entry(account_id, E::KIND, local_id)
            .await?
            .ok_or_else(|| StoreError::not_found(E::KIND, local_id))?;
        let Some(remote_id) = entry.remote_id else {
            // Nothing to accept: the entity never made it to the server.
            // Keeping local is the only coherent outcome.
            return self.keep_local::<E>(account_id, local_id).await;
        };

        let Some(mut current) = EntityStore::<E>::get(store, account_id, local_id).await? else {
            return Err(StoreError::not_found(E::KIND, local_id).into());
        };
        let parent = match self.parent_remote(&current).await? {
            ParentRemote::Root => None,
            ParentRemote::Resolved(parent_id) => Some(parent_id),
            ParentRemote::Unresolved => {
                return Err(SyncError::Gateway(GatewayError::Protocol(format!(
                    "parent of {} {} has no remote id despite a pushed child",
                    E::KIND.as_str(),
                    local_id
                ))));
            }
        };

        let remote = self
            .with_retry("fetch", || {
                EntityGateway::<E>::fetch(gateway, parent, remote_id)
            })
            .await?;
        current.merge_remote(&remote.entity);
        let refreshed = IdentityEntry::new_remote(
            account_id,
            E::KIND,
            local_id,
            remote.head.remote_id,
            remote.head.etag.clone(),
        );
        EntityStore::<E>::save_with_entry(store, &current, &refreshed).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Pull phase
    // ------------------------------------------------------------------

    async fn pull_account(
        &self,
        gateway: &F::Gateway,
        account: &mut Account,
        summary: &mut SyncSummary,
    ) -> Result<(), SyncError> {
        let account_id = account.id();

        match self
            .with_retry("probe", || gateway.probe(account.etag()))
            .await?
        {
            AccountProbe::NotModified => {
                debug!(%account_id, "Account unchanged server-side; skipping pull");
                return Ok(());
            }
            AccountProbe::Modified(Some(etag)) => account.update_etag(etag),
            AccountProbe::Modified(None) => account.clear_etag(),
        }

        self.pull_users(gateway, account_id, summary).await?;

        let mut seen_boards = HashSet::new();
        let mut seen_labels = HashSet::new();
        let mut seen_stacks = HashSet::new();
        let mut seen_cards = HashSet::new();
        let mut seen_comments = HashSet::new();
        let mut seen_attachments = HashSet::new();

        let boards = self
            .pull_kind::<Board>(gateway, account_id, None, None, summary)
            .await?;
        seen_boards.extend(boards.iter().map(|(remote, _)| *remote));

        for (board_remote, board_local) in &boards {
            let labels = self
                .pull_kind::<Label>(
                    gateway,
                    account_id,
                    Some(*board_remote),
                    Some(*board_local),
                    summary,
                )
                .await?;
            seen_labels.extend(labels.iter().map(|(remote, _)| *remote));

            let stacks = self
                .pull_kind::<Stack>(
                    gateway,
                    account_id,
                    Some(*board_remote),
                    Some(*board_local),
                    summary,
                )
                .await?;
            seen_stacks.extend(stacks.iter().map(|(remote, _)| *remote));

            for (stack_remote, stack_local) in &stacks {
                let cards = self
                    .pull_kind::<Card>(
                        gateway,
                        account_id,
                        Some(*stack_remote),
                        Some(*stack_local),
                        summary,
                    )
                    .await?;
                seen_cards.extend(cards.iter().map(|(remote, _)| *remote));

                for (card_remote, card_local) in &cards {
                    let comments = self
                        .pull_kind::<Comment>(
                            gateway,
                            account_id,
                            Some(*card_remote),
                            Some(*card_local),
                            summary,
                        )
                        .await?;
                    seen_comments.extend(comments.iter().map(|(remote, _)| *remote));

                    let attachments = self
                        .pull_kind::<Attachment>(
                            gateway,
                            account_id,
                            Some(*card_remote),
                            Some(*card_local),
                            summary,
                        )
                        .await?;
                    seen_attachments.extend(attachments.iter().map(|(remote, _)| *remote));
                }
            }
        }

        self.sweep_missing::<Board>(account_id, &seen_boards).await?;
        self.sweep_missing::<Label>(account_id, &seen_labels).await?;
        self.sweep_missing::<Stack>(account_id, &seen_stacks).await?;
        self.sweep_missing::<Card>(account_id, &seen_cards).await?;
        self.sweep_missing::<Comment>(account_id, &seen_comments)
            .await?;
        self.sweep_missing::<Attachment>(account_id, &seen_attachments)
            .await?;

        Ok(())
    }

    /// Merges one kind's remote listing into the store
    ///
    /// Returns the `(remote, local)` id pairs seen, which drive both the
    /// child walks and remote-deletion detection.
    async fn pull_kind<E>(
        &self,
        gateway: &F::Gateway,
        account_id: AccountId,
        parent_remote: Option<RemoteId>,
        parent_local: Option<LocalId>,
        summary: &mut SyncSummary,
    ) -> Result<Vec<(RemoteId, LocalId)>, SyncError>
    where
        E: Syncable,
        S: EntityStore<E>,
        F::Gateway: EntityGateway<E>,
    {
        let store = &self.inner.store;
        let remotes = self
            .with_retry("list", || EntityGateway::<E>::list(gateway, parent_remote))
            .await?;
        let mut seen = Vec::with_capacity(remotes.len());

        for remote in remotes {
            let head = remote.head;
            match store
                .resolve_remote(account_id, E::KIND, head.remote_id)
                .await?
            {
                None => {
                    let mut entity = remote.entity;
                    if let Some(parent) = parent_local {
                        entity.attach_parent(parent);
                    }
                    let entry = IdentityEntry::new_remote(
                        account_id,
                        E::KIND,
                        entity.local_id(),
                        head.remote_id,
                        head.etag.clone(),
                    );
                    EntityStore::<E>::save_with_entry(store, &entity, &entry).await?;
                    summary.pulled += 1;
                    seen.push((head.remote_id, entity.local_id()));
                }
                Some(entry) => {
                    seen.push((head.remote_id, entry.local_id));
                    // Anything with pending local state (dirty, pushing,
                    // conflicted, tombstoned) is left alone; push resolves
                    // it first.
                    if entry.status != SyncStatus::Clean {
                        continue;
                    }
                    if entry.etag.is_some() && entry.etag == head.etag {
                        continue;
                    }
                    if let Some(mut current) =
                        EntityStore::<E>::get(store, account_id, entry.local_id).await?
                    {
                        current.merge_remote(&remote.entity);
                        // The record was listed under this parent; another
                        // client may have moved it here.
                        if let Some(parent) = parent_local {
                            current.attach_parent(parent);
                        }
                        let refreshed = IdentityEntry::new_remote(
                            account_id,
                            E::KIND,
                            entry.local_id,
                            head.remote_id,
                            head.etag.clone(),
                        );
                        EntityStore::<E>::save_with_entry(store, &current, &refreshed).await?;
                        summary.pulled += 1;
                    }
                }
            }
        }

        Ok(seen)
    }

    /// Tombstones local rows whose remote counterpart disappeared
    ///
    /// The next push pass reconciles the tombstone, where the server's
    /// `NotFound` counts as success. Entities with pending local changes
    /// are kept: their push either recreates the object or surfaces a
    /// conflict the user can resolve.
    async fn sweep_missing<E>(
        &self,
        account_id: AccountId,
        seen: &HashSet<RemoteId>,
    ) -> Result<(), SyncError>
    where
        E: Syncable,
    {
        let store = &self.inner.store;
        for (local_id, remote_id) in store.known_remote_ids(account_id, E::KIND).await? {
            if seen.contains(&remote_id) {
                continue;
            }
            let Some(entry) = store.entry(account_id, E::KIND, local_id).await? else {
                continue;
            };
            match entry.status {
                SyncStatus::Dirty | SyncStatus::Pushing | SyncStatus::Deleted => {}
                _ => {
                    debug!(
                        kind = E::KIND.as_str(),
                        %local_id,
                        %remote_id,
                        "Remote object gone; tombstoning local copy"
                    );
                    store.mark_deleted(account_id, E::KIND, local_id).await?;
                }
            }
        }
        Ok(())
    }

    /// Pulls the server's user list
    ///
    /// Users are server-owned: new ones are inserted, changed ones merged,
    /// and ones the server no longer reports are purged outright.
    async fn pull_users(
        &self,
        gateway: &F::Gateway,
        account_id: AccountId,
        summary: &mut SyncSummary,
    ) -> Result<(), SyncError> {
        let store = &self.inner.store;
        let remotes = self.with_retry("users", || gateway.fetch_users()).await?;
        let mut seen = HashSet::new();

        for remote in remotes {
            let head = remote.head;
            seen.insert(head.remote_id);
            match store
                .resolve_remote(account_id, EntityKind::User, head.remote_id)
                .await?
            {
                None => {
                    let entity = remote.entity;
                    let entry = IdentityEntry::new_remote(
                        account_id,
                        EntityKind::User,
                        entity.local_id(),
                        head.remote_id,
                        head.etag.clone(),
                    );
                    EntityStore::<User>::save_with_entry(store, &entity, &entry).await?;
                    summary.pulled += 1;
                }
                Some(entry) => {
                    if let Some(mut current) =
                        EntityStore::<User>::get(store, account_id, entry.local_id).await?
                    {
                        current.merge_remote(&remote.entity);
                        let refreshed = IdentityEntry::new_remote(
                            account_id,
                            EntityKind::User,
                            entry.local_id,
                            head.remote_id,
                            head.etag.clone(),
                        );
                        EntityStore::<User>::save_with_entry(store, &current, &refreshed).await?;
                    }
                }
            }
        }

        for (local_id, remote_id) in store.known_remote_ids(account_id, EntityKind::User).await? {
            if !seen.contains(&remote_id) {
                EntityStore::<User>::remove(store, account_id, local_id).await?;
                IdentityMap::remove(store, account_id, EntityKind::User, local_id).await?;
            }
        }

        Ok(())
    }

    // ------------------------------------------------------------------
    // Retry helper
    // ------------------------------------------------------------------

    /// Retries transient gateway failures with exponential backoff
    async fn with_retry<T, Op, Fut>(&self, operation: &'static str, op: Op) -> Result<T, GatewayError>
    where
        Op: Fn() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let max_attempts = self.inner.settings.max_retries.max(1);
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempt, "Request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && attempt + 1 < max_attempts => {
                    let delay = self.inner.settings.retry_base_delay * 2u32.saturating_pow(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient gateway error; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

// ============================================================================
// Watches
// ============================================================================

/// Live view of one card aggregate
///
/// Yields the current snapshot first, then a fresh read after every change
/// in the account. A deleted card surfaces as a `NotFound` store error.
pub struct AggregateWatch<S, F> {
    engine: SyncEngine<S, F>,
    feed: Box<dyn ChangeFeed>,
    account_id: AccountId,
    card: LocalId,
    primed: bool,
}

impl<S, F> AggregateWatch<S, F>
where
    S: SyncStore,
    F: GatewayFactory,
{
    /// Waits for the next aggregate state
    ///
    /// Returns `None` once the store's change bus is gone.
    pub async fn next(&mut self) -> Option<Result<CardAggregate, SyncError>> {
        if self.primed {
            self.primed = false;
        } else {
            self.feed.recv().await?;
        }
        Some(self.engine.get_aggregate(self.account_id, self.card).await)
    }
}

/// Live view of one account record
pub struct AccountWatch<S, F> {
    engine: SyncEngine<S, F>,
    feed: Box<dyn ChangeFeed>,
    account_id: AccountId,
    primed: bool,
}

impl<S, F> AccountWatch<S, F>
where
    S: SyncStore,
    F: GatewayFactory,
{
    /// Waits for the next account state
    ///
    /// Entity-level events in the account are skipped; only account record
    /// changes (and resync signals) trigger a re-read.
    pub async fn next(&mut self) -> Option<Result<Account, SyncError>> {
        if self.primed {
            self.primed = false;
        } else {
            loop {
                match self.feed.recv().await? {
                    ChangeSignal::Event(ChangeEvent::Account { .. }) | ChangeSignal::Resync => {
                        break;
                    }
                    ChangeSignal::Event(ChangeEvent::Entity { .. }) => continue,
                }
            }
        }
        Some(self.engine.read_account(self.account_id).await)
    }
}
