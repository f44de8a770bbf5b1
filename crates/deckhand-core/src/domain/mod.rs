//! Domain entities and business logic
//!
//! This module contains the core domain types for Deckhand:
//! - Newtypes for type-safe identifiers and validated domain types
//! - Account management types
//! - The kanban entity hierarchy (boards, stacks, cards, and card children)
//! - The per-entity sync status state machine
//! - Identity map entries linking local and remote identities
//! - The read-side card aggregate
//! - Domain-specific error types

pub mod account;
pub mod aggregate;
pub mod entities;
pub mod errors;
pub mod identity;
pub mod newtypes;
pub mod status;

// Re-export commonly used types
pub use account::{Account, AccountState};
pub use aggregate::CardAggregate;
pub use entities::{
    Attachment, Board, Card, Comment, EntityKind, Label, Stack, Syncable, User,
};
pub use errors::DomainError;
pub use identity::IdentityEntry;
pub use newtypes::*;
pub use status::SyncStatus;
