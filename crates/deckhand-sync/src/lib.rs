//! Deckhand Sync - Reconciliation engine
//!
//! Orchestrates the local store and the remote gateway into eventually
//! consistent state. A sync pass pushes local edits first (tombstones, then
//! dirty entities, parents before children), then pulls the remote tree and
//! merges it into clean local rows. Per-account passes never overlap;
//! requests arriving mid-pass coalesce into a single queued re-run.
//!
//! ## Key Components
//!
//! - [`SyncEngine`] - Facade for local mutations, aggregate reads, watches,
//!   and sync triggers
//! - [`sessions::SessionRegistry`] - Per-account sync lease with re-run
//!   coalescing
//! - [`assembler`] - Builds `CardAggregate` read models from store rows
//!
//! ## Usage
//!
//! ```no_run
//! use deckhand_sync::{EngineSettings, GatewayFactory, SyncEngine, SyncError};
//!
//! # async fn example<S, F>(store: S, gateways: F) -> Result<(), SyncError>
//! # where S: deckhand_sync::SyncStore, F: GatewayFactory {
//! let engine = SyncEngine::new(store, gateways, EngineSettings::default());
//! for account in engine.list_accounts().await? {
//!     engine.trigger_sync(account.id());
//! }
//! # Ok(())
//! # }
//! ```

use thiserror::Error;

use deckhand_core::domain::{AccountId, DomainError};
use deckhand_core::ports::{GatewayError, StoreError};

pub mod assembler;
pub mod engine;
pub mod sessions;

pub use engine::{
    ConflictPolicy, ConflictResolution, EngineSettings, GatewayFactory, SyncEngine, SyncGateway,
    SyncStore, SyncSummary,
};
pub use sessions::SessionRegistry;

/// Errors surfaced by the sync engine
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Remote gateway failure
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// A domain rule rejected the operation
    #[error("Domain rule violated: {0}")]
    Domain(#[from] DomainError),

    /// The account is not configured locally
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),
}

impl SyncError {
    /// Whether the error means the account's credentials were rejected
    pub fn is_authentication(&self) -> bool {
        matches!(self, SyncError::Gateway(GatewayError::Unauthorized))
    }
}
