//! SQLite connection pooling
//!
//! Wraps an SQLx `SqlitePool` and runs the schema migrations before handing
//! the pool out, so a [`DatabasePool`] always points at a current schema.
//! File-backed pools run in WAL mode with a busy timeout; the in-memory
//! variant exists for tests.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::{migrations, StoreInitError};

/// SQLite pool with the schema already migrated
///
/// A failed migration refuses to hand out a pool at all; adapters never see
/// a half-migrated database.
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens (or creates) the database file and migrates its schema
    ///
    /// Missing parent directories are created first. WAL keeps watch
    /// re-reads unblocked while a sync pass writes; the busy timeout covers
    /// short write contention between the two.
    ///
    /// # Errors
    ///
    /// `StoreInitError::ConnectionFailed` when the file cannot be opened,
    /// `StoreInitError::MigrationFailed` when a schema step fails.
    pub async fn new(db_path: &Path) -> Result<Self, StoreInitError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreInitError::ConnectionFailed(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                StoreInitError::ConnectionFailed(format!(
                    "Failed to connect to database at {}: {}",
                    db_path.display(),
                    e
                ))
            })?;

        migrations::run(&pool).await?;

        tracing::info!(
            path = %db_path.display(),
            "Database pool initialized"
        );

        Ok(Self { pool })
    }

    /// Opens a fresh in-memory database for tests
    ///
    /// Capped at one connection: SQLite gives every connection its own
    /// in-memory database, so a second connection would see empty tables.
    ///
    /// # Errors
    ///
    /// `StoreInitError::ConnectionFailed` when the connection cannot be
    /// opened, `StoreInitError::MigrationFailed` when a schema step fails.
    pub async fn in_memory() -> Result<Self, StoreInitError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                StoreInitError::ConnectionFailed(format!(
                    "Failed to create in-memory database: {}",
                    e
                ))
            })?;

        migrations::run(&pool).await?;

        tracing::debug!("In-memory database pool initialized");

        Ok(Self { pool })
    }

    /// The raw SQLx pool, for adapters and tests
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
