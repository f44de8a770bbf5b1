//! Per-entity synchronization status state machine
//!
//! Every syncable entity moves through a small, explicit state machine that
//! tracks whether its local row agrees with the server:
//!
//! ```text
//!     ┌────────┐    edit      ┌────────┐    push start   ┌─────────┐
//!     │ Clean  │ ───────────► │ Dirty  │ ──────────────► │ Pushing │
//!     └────────┘              └────────┘                 └─────────┘
//!          ▲                       ▲                       │  │  │
//!          │ push ok               │ retryable failure     │  │  │
//!          └───────────────────────┼───────────────────────┘  │  │
//!                                  └──────────────────────────┘  │
//!                                                 etag mismatch  │
//!                                                                ▼
//!                                                         ┌────────────┐
//!                                                         │ Conflicted │
//!                                                         └────────────┘
//! ```
//!
//! `Deleted` is the tombstone state for entities awaiting a remote delete.
//! `Conflicted` is terminal until explicit resolution (keep-local re-enters
//! `Dirty`, accept-remote re-enters `Clean`).

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::DomainError;

/// Synchronization status of a single entity, stored in the identity map
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Synced: local row agrees with the server, no pending edits
    Clean,
    /// Local edit pending push
    #[default]
    Dirty,
    /// A push for this entity is in flight
    Pushing,
    /// The server rejected a conditional update (etag mismatch);
    /// requires explicit resolution
    Conflicted,
    /// Tombstoned locally, pending remote delete
    Deleted,
}

impl SyncStatus {
    /// Returns true if the entity has local changes the server has not seen
    pub fn has_pending_changes(&self) -> bool {
        matches!(self, SyncStatus::Dirty | SyncStatus::Pushing | SyncStatus::Deleted)
    }

    /// Returns true if the entity needs user or policy attention
    pub fn needs_attention(&self) -> bool {
        matches!(self, SyncStatus::Conflicted)
    }

    /// Returns true if a pull may overwrite the local row in this status
    ///
    /// Pulls never clobber local edits: only `Clean` rows are overwritten.
    pub fn pull_may_overwrite(&self) -> bool {
        matches!(self, SyncStatus::Clean)
    }

    /// Returns the status name as a static string
    pub fn name(&self) -> &'static str {
        match self {
            SyncStatus::Clean => "Clean",
            SyncStatus::Dirty => "Dirty",
            SyncStatus::Pushing => "Pushing",
            SyncStatus::Conflicted => "Conflicted",
            SyncStatus::Deleted => "Deleted",
        }
    }

    /// Checks if a status transition is valid
    ///
    /// Valid transitions:
    /// - Clean -> Dirty (local edit), Deleted (local delete)
    /// - Dirty -> Pushing, Deleted
    /// - Pushing -> Clean (push ok), Dirty (retryable failure),
    ///   Conflicted (etag mismatch)
    /// - Conflicted -> Dirty (keep-local), Clean (accept-remote), Deleted
    /// - Deleted -> (terminal; the row is removed once the remote delete lands)
    pub fn can_transition_to(&self, target: SyncStatus) -> bool {
        use SyncStatus::*;
        match (self, target) {
            (Clean, Dirty) | (Clean, Deleted) => true,
            (Dirty, Pushing) | (Dirty, Deleted) => true,
            (Pushing, Clean) | (Pushing, Dirty) | (Pushing, Conflicted) => true,
            (Conflicted, Dirty) | (Conflicted, Clean) | (Conflicted, Deleted) => true,
            _ => false,
        }
    }

    /// Validates a transition, returning the target on success
    ///
    /// # Errors
    /// Returns `DomainError::InvalidTransition` if the transition is not allowed.
    pub fn transition_to(&self, target: SyncStatus) -> Result<SyncStatus, DomainError> {
        if !self.can_transition_to(target) {
            return Err(DomainError::InvalidTransition {
                from: self.name(),
                to: target.name(),
            });
        }
        Ok(target)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Clean => write!(f, "clean"),
            SyncStatus::Dirty => write!(f, "dirty"),
            SyncStatus::Pushing => write!(f, "pushing"),
            SyncStatus::Conflicted => write!(f, "conflicted"),
            SyncStatus::Deleted => write!(f, "deleted"),
        }
    }
}
