//! Remote gateway ports (driven/secondary ports)
//!
//! These traits define the boundary to the remote kanban service. The
//! adapter crate implements them over HTTP; the sync engine only ever sees
//! the typed operations and the [`GatewayError`] taxonomy below.
//!
//! ## Design Notes
//!
//! - Unlike the store ports, gateway errors are fully classified: the sync
//!   engine reacts differently to a conflict (stop pushing this entity),
//!   an auth failure (abort the whole pass), and a transient network error
//!   (retry with backoff).
//! - Remote payloads cross this boundary as domain entities plus a
//!   [`RemoteHead`]; wire DTOs stay inside the adapter.
//! - Conditional semantics: updates send the last known etag and the server
//!   rejects the write when it does not match the current head.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Etag, RemoteId, Syncable, User};

// ============================================================================
// Gateway errors
// ============================================================================

/// Classified failures from the remote gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Credentials were rejected; the account needs re-authentication
    #[error("Unauthorized: the server rejected the stored credentials")]
    Unauthorized,

    /// The addressed remote object does not exist
    #[error("Not found: remote object {0}")]
    NotFound(RemoteId),

    /// A conditional update was rejected because the etag no longer matches
    #[error("Conflict: remote object {remote_id} changed (had {stale_etag:?})")]
    Conflict {
        /// The object whose head moved
        remote_id: RemoteId,
        /// The etag the client sent
        stale_etag: Option<Etag>,
    },

    /// The server could not be reached (DNS, connect, timeout)
    #[error("Unreachable: {0}")]
    Unreachable(String),

    /// The server answered with a 5xx status
    #[error("Server error: HTTP {status}")]
    Server {
        /// HTTP status code
        status: u16,
    },

    /// The response could not be parsed or violated the protocol
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// Returns true if retrying the same request later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Unreachable(_) | GatewayError::Server { .. }
        )
    }
}

// ============================================================================
// Port-level DTOs
// ============================================================================

/// The server's identity and freshness answer for one object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHead {
    /// Server-assigned identifier
    pub remote_id: RemoteId,
    /// Freshness token for the object, if the server provides one
    pub etag: Option<Etag>,
}

/// One entity as the server currently sees it
///
/// The payload is already mapped into the domain entity type; local-only
/// fields (local id, account id, local parent id) are filled in by the
/// adapter from the request context and are placeholders the sync engine
/// resolves through the identity map.
#[derive(Debug, Clone)]
pub struct RemoteEntity<E> {
    /// Identity and freshness
    pub head: RemoteHead,
    /// Remote id of the parent object, if the kind has a parent
    pub parent_remote_id: Option<RemoteId>,
    /// The mapped payload
    pub entity: E,
}

/// Outcome of an account-level freshness probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountProbe {
    /// Nothing changed server-side since the given etag; skip the pull
    NotModified,
    /// The account's data changed; the new account etag to store
    Modified(Option<Etag>),
}

// ============================================================================
// EntityGateway trait
// ============================================================================

/// Remote CRUD operations for one syncable entity kind
///
/// Every call is scoped to one account through the adapter's construction;
/// `parent` is the remote id of the owning object for kinds that have one
/// (stacks under boards, cards under stacks, and so on) and `None` for
/// boards.
#[async_trait]
pub trait EntityGateway<E: Syncable>: Send + Sync {
    /// Lists every entity of this kind under a parent
    async fn list(&self, parent: Option<RemoteId>) -> Result<Vec<RemoteEntity<E>>, GatewayError>;

    /// Fetches one entity by remote id
    async fn fetch(
        &self,
        parent: Option<RemoteId>,
        remote_id: RemoteId,
    ) -> Result<RemoteEntity<E>, GatewayError>;

    /// Creates the entity remotely, returning the server-assigned head
    async fn create(
        &self,
        parent: Option<RemoteId>,
        entity: &E,
    ) -> Result<RemoteHead, GatewayError>;

    /// Updates the entity remotely, conditional on the last known etag
    ///
    /// A `GatewayError::Conflict` means the server head moved since the
    /// etag was recorded.
    async fn update(
        &self,
        parent: Option<RemoteId>,
        remote_id: RemoteId,
        etag: Option<&Etag>,
        entity: &E,
    ) -> Result<RemoteHead, GatewayError>;

    /// Deletes the entity remotely
    ///
    /// `GatewayError::NotFound` counts as success for the caller: the goal
    /// state (object gone) already holds.
    async fn delete(
        &self,
        parent: Option<RemoteId>,
        remote_id: RemoteId,
    ) -> Result<(), GatewayError>;
}

// ============================================================================
// AccountGateway trait
// ============================================================================

/// Account-level remote operations
#[async_trait]
pub trait AccountGateway: Send + Sync {
    /// Probes whether anything changed server-side since the given etag
    ///
    /// Sends the stored account etag; a not-modified answer lets the whole
    /// pull pass be skipped.
    async fn probe(&self, etag: Option<&Etag>) -> Result<AccountProbe, GatewayError>;

    /// Fetches the users known to the server for this account
    ///
    /// Users are pull-only: they are never created, updated, or deleted
    /// through this client.
    async fn fetch_users(&self) -> Result<Vec<RemoteEntity<User>>, GatewayError>;
}
