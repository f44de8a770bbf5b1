//! Deckhand Store - Local state persistence
//!
//! SQLite-based store for:
//! - The kanban entity hierarchy (boards, stacks, cards, and card children)
//! - The identity map (local↔remote ids, etags, sync status)
//! - Account records
//! - Card↔label and card↔user assignments
//!
//! ## Architecture
//!
//! This crate implements the store ports from `deckhand-core` using SQLite
//! as the storage backend. It is a driven (secondary) adapter in the
//! hexagonal architecture. Every mutation publishes a [`observer::ChangeEvent`]
//! so read-side observers can re-read affected data.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with `user_version` migrations
//! - [`SqliteStore`] - Implements `EntityStore` for every entity kind plus
//!   `IdentityMap`, `AccountStore`, and `CardLinks`
//! - [`observer::ChangeBus`] - Broadcast channel for change events
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use deckhand_store::{DatabasePool, SqliteStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/deckhand/deckhand.db")).await?;
//! let store = SqliteStore::new(pool.pool().clone());
//! // Use store through the port traits...
//! # Ok(())
//! # }
//! ```

pub mod identity;
pub mod migrations;
pub mod observer;
pub mod pool;
pub mod repository;

pub use deckhand_core::ports::{Change, ChangeEvent, ChangeScope, ChangeSignal};
pub use observer::{ChangeBus, ChangeStream};
pub use pool::DatabasePool;
pub use repository::SqliteStore;

/// Errors that can occur while bringing the store up
#[derive(Debug, thiserror::Error)]
pub enum StoreInitError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}
