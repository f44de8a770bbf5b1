//! Forward-only schema migrations
//!
//! The schema version lives in SQLite's `PRAGMA user_version`. On startup
//! every step with a number above the stored version runs, in order, inside
//! its own transaction, and the version is bumped afterwards. Steps are
//! append-only: shipped steps are never edited, a schema change is always a
//! new step.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use crate::StoreInitError;

/// One migration step: a target version and the SQL that reaches it
struct Migration {
    version: i64,
    sql: &'static str,
}

/// All schema migrations, ordered by version
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: r#"
CREATE TABLE accounts (
    id          TEXT PRIMARY KEY,
    server_url  TEXT NOT NULL,
    user_name   TEXT NOT NULL,
    credential  TEXT NOT NULL,
    last_sync   TEXT,
    state       TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

CREATE TABLE entities (
    account_id       TEXT NOT NULL,
    kind             TEXT NOT NULL,
    local_id         TEXT NOT NULL,
    parent_local_id  TEXT,
    payload          TEXT NOT NULL,
    PRIMARY KEY (account_id, kind, local_id)
);

CREATE INDEX idx_entities_parent
    ON entities (account_id, kind, parent_local_id);

CREATE TABLE identity_map (
    account_id  TEXT NOT NULL,
    kind        TEXT NOT NULL,
    local_id    TEXT NOT NULL,
    remote_id   INTEGER,
    etag        TEXT,
    status      TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    PRIMARY KEY (account_id, kind, local_id),
    UNIQUE (account_id, kind, remote_id)
);

CREATE INDEX idx_identity_status
    ON identity_map (account_id, kind, status);

CREATE TABLE card_labels (
    account_id      TEXT NOT NULL,
    card_local_id   TEXT NOT NULL,
    label_local_id  TEXT NOT NULL,
    PRIMARY KEY (account_id, card_local_id, label_local_id)
);

CREATE TABLE card_users (
    account_id     TEXT NOT NULL,
    card_local_id  TEXT NOT NULL,
    user_local_id  TEXT NOT NULL,
    PRIMARY KEY (account_id, card_local_id, user_local_id)
);
"#,
    },
    // Account-level etag for the pull short-circuit probe. NULL for
    // existing rows forces one full pull after the upgrade.
    Migration {
        version: 2,
        sql: "ALTER TABLE accounts ADD COLUMN etag TEXT;",
    },
];

/// Current schema version expected by this build
pub const SCHEMA_VERSION: i64 = 2;

/// Reads the stored schema version
pub async fn current_version(pool: &SqlitePool) -> Result<i64, StoreInitError> {
    let row = sqlx::query("PRAGMA user_version;")
        .fetch_one(pool)
        .await
        .map_err(|e| StoreInitError::MigrationFailed(format!("Failed to read user_version: {}", e)))?;
    Ok(row.get::<i64, _>(0))
}

/// Applies every pending migration step in order
pub async fn run(pool: &SqlitePool) -> Result<(), StoreInitError> {
    let mut version = current_version(pool).await?;

    for migration in MIGRATIONS {
        if migration.version <= version {
            continue;
        }

        let mut tx = pool.begin().await.map_err(|e| {
            StoreInitError::MigrationFailed(format!(
                "Failed to open transaction for migration {}: {}",
                migration.version, e
            ))
        })?;

        sqlx::raw_sql(migration.sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                StoreInitError::MigrationFailed(format!(
                    "Migration {} failed: {}",
                    migration.version, e
                ))
            })?;

        // user_version does not take bind parameters
        sqlx::raw_sql(&format!("PRAGMA user_version = {};", migration.version))
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                StoreInitError::MigrationFailed(format!(
                    "Failed to bump user_version to {}: {}",
                    migration.version, e
                ))
            })?;

        tx.commit().await.map_err(|e| {
            StoreInitError::MigrationFailed(format!(
                "Failed to commit migration {}: {}",
                migration.version, e
            ))
        })?;

        tracing::info!(from = version, to = migration.version, "Applied schema migration");
        version = migration.version;
    }

    Ok(())
}
