//! SQLite implementation of the store ports
//!
//! This module provides the concrete SQLite-based implementation of the
//! persistence ports defined in deckhand-core: entity rows, accounts, and
//! the card assignment junctions. The identity map implementation lives in
//! the sibling `identity` module on the same store type.
//!
//! ## Type Mapping
//!
//! | Domain Type          | SQL Type | Strategy                                   |
//! |----------------------|----------|--------------------------------------------|
//! | LocalId, AccountId   | TEXT     | UUID string via `.to_string()` / `FromStr` |
//! | RemoteId             | INTEGER  | `i64` via `.as_i64()` / `RemoteId::new()`  |
//! | Etag, ServerUrl, ... | TEXT     | Validated string newtypes                  |
//! | DateTime<Utc>        | TEXT     | ISO 8601 via `to_rfc3339()`                |
//! | Entity payloads      | TEXT     | serde_json serialization                   |
//! | SyncStatus           | TEXT     | Plain lowercase string                     |
//!
//! All entity kinds share one `entities` table keyed on
//! `(account_id, kind, local_id)` with the payload as a JSON column; the
//! kind discriminator comes from `Syncable::KIND`, which is what lets a
//! single generic implementation serve every entity type.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use deckhand_core::domain::{
    Account, AccountId, AccountState, CredentialRef, Etag, IdentityEntry, LocalId, ServerUrl,
    Syncable,
};
use deckhand_core::ports::{
    AccountStore, CardLinks, Change, ChangeEvent, ChangeFeed, ChangeScope, EntityStore,
    Observable, StoreError,
};

use crate::observer::{ChangeBus, ChangeStream};

/// SQLite-based implementation of the store ports
///
/// One instance serves every entity kind plus accounts, the identity map,
/// and the card junctions. All operations go through a connection pool;
/// every mutation publishes a change event after its transaction commits.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    bus: ChangeBus,
}

impl SqliteStore {
    /// Creates a new store instance with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            bus: ChangeBus::new(),
        }
    }

    /// Returns the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Opens a subscription to this store's change events
    pub fn subscribe(&self, scope: ChangeScope) -> ChangeStream {
        self.bus.subscribe(scope)
    }

    pub(crate) fn publish(&self, event: ChangeEvent) {
        self.bus.publish(event);
    }
}

impl Observable for SqliteStore {
    fn subscribe(&self, scope: ChangeScope) -> Box<dyn ChangeFeed> {
        Box::new(self.bus.subscribe(scope))
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

pub(crate) fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(anyhow::anyhow!(e))
}

pub(crate) fn parse_local_id(s: &str) -> Result<LocalId, StoreError> {
    LocalId::from_str(s).map_err(StoreError::Domain)
}

pub(crate) fn parse_account_id(s: &str) -> Result<AccountId, StoreError> {
    AccountId::from_str(s).map_err(StoreError::Domain)
}

/// Parse a DateTime<Utc> from an ISO 8601 string
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            StoreError::Database(anyhow::anyhow!("Failed to parse datetime '{}': {}", s, e))
        })
}

/// Serialize an AccountState to a string for storage
fn account_state_to_string(state: &AccountState) -> String {
    match state {
        AccountState::Active => "active".to_string(),
        AccountState::AuthenticationRequired => "authentication_required".to_string(),
        AccountState::Error(msg) => format!("error:{}", msg),
    }
}

/// Deserialize an AccountState from its stored string representation
fn account_state_from_string(s: &str) -> Result<AccountState, StoreError> {
    match s {
        "active" => Ok(AccountState::Active),
        "authentication_required" => Ok(AccountState::AuthenticationRequired),
        s if s.starts_with("error:") => Ok(AccountState::Error(s[6..].to_string())),
        other => Err(StoreError::Database(anyhow::anyhow!(
            "Unknown account state: {}",
            other
        ))),
    }
}

fn entity_from_row<E: Syncable>(row: &SqliteRow) -> Result<E, StoreError> {
    let payload: String = row.get("payload");
    serde_json::from_str(&payload).map_err(|e| {
        StoreError::Database(anyhow::anyhow!(
            "Invalid {} payload JSON: {}",
            E::KIND.as_str(),
            e
        ))
    })
}

fn entity_payload<E: Syncable>(entity: &E) -> Result<String, StoreError> {
    serde_json::to_string(entity).map_err(|e| {
        StoreError::Database(anyhow::anyhow!(
            "Failed to serialize {} payload: {}",
            E::KIND.as_str(),
            e
        ))
    })
}

// ============================================================================
// EntityStore: one generic implementation for every syncable kind
// ============================================================================

#[async_trait]
impl<E: Syncable> EntityStore<E> for SqliteStore {
    async fn save(&self, entity: &E) -> Result<(), StoreError> {
        let payload = entity_payload(entity)?;
        let account = entity.account_id().to_string();
        let kind = E::KIND.as_str();
        let local = entity.local_id().to_string();
        let parent = entity.parent_local_id().map(|p| p.to_string());

        let existed: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM entities
                WHERE account_id = ? AND kind = ? AND local_id = ?
            )
            "#,
        )
        .bind(&account)
        .bind(kind)
        .bind(&local)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO entities (account_id, kind, local_id, parent_local_id, payload)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (account_id, kind, local_id)
            DO UPDATE SET parent_local_id = excluded.parent_local_id,
                          payload = excluded.payload
            "#,
        )
        .bind(&account)
        .bind(kind)
        .bind(&local)
        .bind(&parent)
        .bind(&payload)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let change = if existed { Change::Updated } else { Change::Created };
        self.publish(ChangeEvent::Entity {
            account_id: entity.account_id(),
            kind: E::KIND,
            local_id: entity.local_id(),
            change,
        });
        Ok(())
    }

    async fn save_with_entry(&self, entity: &E, entry: &IdentityEntry) -> Result<(), StoreError> {
        let payload = entity_payload(entity)?;
        let account = entity.account_id().to_string();
        let kind = E::KIND.as_str();
        let local = entity.local_id().to_string();
        let parent = entity.parent_local_id().map(|p| p.to_string());

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r#"
            INSERT INTO entities (account_id, kind, local_id, parent_local_id, payload)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (account_id, kind, local_id)
            DO UPDATE SET parent_local_id = excluded.parent_local_id,
                          payload = excluded.payload
            "#,
        )
        .bind(&account)
        .bind(kind)
        .bind(&local)
        .bind(&parent)
        .bind(&payload)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        crate::identity::upsert_entry(&mut tx, entry).await?;

        tx.commit().await.map_err(db_err)?;

        self.publish(ChangeEvent::Entity {
            account_id: entity.account_id(),
            kind: E::KIND,
            local_id: entity.local_id(),
            change: Change::Updated,
        });
        Ok(())
    }

    async fn get(
        &self,
        account_id: AccountId,
        local_id: LocalId,
    ) -> Result<Option<E>, StoreError> {
        let row = sqlx::query(
            "SELECT payload FROM entities WHERE account_id = ? AND kind = ? AND local_id = ?",
        )
        .bind(account_id.to_string())
        .bind(E::KIND.as_str())
        .bind(local_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|r| entity_from_row::<E>(&r)).transpose()
    }

    async fn list_children(
        &self,
        account_id: AccountId,
        parent: Option<LocalId>,
    ) -> Result<Vec<E>, StoreError> {
        let rows = match parent {
            Some(parent) => {
                sqlx::query(
                    r#"
                    SELECT payload FROM entities
                    WHERE account_id = ? AND kind = ? AND parent_local_id = ?
                    ORDER BY local_id
                    "#,
                )
                .bind(account_id.to_string())
                .bind(E::KIND.as_str())
                .bind(parent.to_string())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT payload FROM entities
                    WHERE account_id = ? AND kind = ?
                    ORDER BY local_id
                    "#,
                )
                .bind(account_id.to_string())
                .bind(E::KIND.as_str())
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(db_err)?;

        rows.iter().map(entity_from_row::<E>).collect()
    }

    async fn remove(&self, account_id: AccountId, local_id: LocalId) -> Result<(), StoreError> {
        let result = sqlx::query(
            "DELETE FROM entities WHERE account_id = ? AND kind = ? AND local_id = ?",
        )
        .bind(account_id.to_string())
        .bind(E::KIND.as_str())
        .bind(local_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() > 0 {
            self.publish(ChangeEvent::Entity {
                account_id,
                kind: E::KIND,
                local_id,
                change: Change::Removed,
            });
        }
        Ok(())
    }
}

// ============================================================================
// AccountStore
// ============================================================================

fn account_from_row(row: &SqliteRow) -> Result<Account, StoreError> {
    let id = parse_account_id(&row.get::<String, _>("id"))?;
    let server_url =
        ServerUrl::new(row.get::<String, _>("server_url")).map_err(StoreError::Domain)?;
    let user_name: String = row.get("user_name");
    let credential =
        CredentialRef::new(row.get::<String, _>("credential")).map_err(StoreError::Domain)?;
    let etag = row
        .get::<Option<String>, _>("etag")
        .map(Etag::new)
        .transpose()
        .map_err(StoreError::Domain)?;
    let last_sync = row
        .get::<Option<String>, _>("last_sync")
        .as_deref()
        .map(parse_datetime)
        .transpose()?;
    let state = account_state_from_string(&row.get::<String, _>("state"))?;
    let created_at = parse_datetime(&row.get::<String, _>("created_at"))?;

    Ok(Account::from_parts(
        id, server_url, user_name, credential, etag, last_sync, state, created_at,
    ))
}

#[async_trait]
impl AccountStore for SqliteStore {
    async fn save_account(&self, account: &Account) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, server_url, user_name, credential, etag,
                                  last_sync, state, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                server_url = excluded.server_url,
                user_name = excluded.user_name,
                credential = excluded.credential,
                etag = excluded.etag,
                last_sync = excluded.last_sync,
                state = excluded.state
            "#,
        )
        .bind(account.id().to_string())
        .bind(account.server_url().as_str())
        .bind(account.user_name())
        .bind(account.credential().as_str())
        .bind(account.etag().map(|e| e.as_str().to_string()))
        .bind(account.last_sync().map(|dt| dt.to_rfc3339()))
        .bind(account_state_to_string(account.state()))
        .bind(account.created_at().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        self.publish(ChangeEvent::Account {
            account_id: account.id(),
        });
        Ok(())
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query("SELECT * FROM accounts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(|r| account_from_row(&r)).transpose()
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let rows = sqlx::query("SELECT * FROM accounts ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter().map(account_from_row).collect()
    }

    async fn remove_account(&self, id: AccountId) -> Result<(), StoreError> {
        let account = id.to_string();
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("DELETE FROM card_labels WHERE account_id = ?")
            .bind(&account)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM card_users WHERE account_id = ?")
            .bind(&account)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM identity_map WHERE account_id = ?")
            .bind(&account)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM entities WHERE account_id = ?")
            .bind(&account)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(&account)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        tracing::info!(account = %account, "Removed account and all local rows");
        Ok(())
    }
}

// ============================================================================
// CardLinks
// ============================================================================

#[async_trait]
impl CardLinks for SqliteStore {
    async fn link_label(
        &self,
        account_id: AccountId,
        card: LocalId,
        label: LocalId,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO card_labels (account_id, card_local_id, label_local_id)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(account_id.to_string())
        .bind(card.to_string())
        .bind(label.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn unlink_label(
        &self,
        account_id: AccountId,
        card: LocalId,
        label: LocalId,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            DELETE FROM card_labels
            WHERE account_id = ? AND card_local_id = ? AND label_local_id = ?
            "#,
        )
        .bind(account_id.to_string())
        .bind(card.to_string())
        .bind(label.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn labels_for_card(
        &self,
        account_id: AccountId,
        card: LocalId,
    ) -> Result<Vec<LocalId>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT label_local_id FROM card_labels
            WHERE account_id = ? AND card_local_id = ?
            "#,
        )
        .bind(account_id.to_string())
        .bind(card.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|r| parse_local_id(&r.get::<String, _>("label_local_id")))
            .collect()
    }

    async fn link_user(
        &self,
        account_id: AccountId,
        card: LocalId,
        user: LocalId,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO card_users (account_id, card_local_id, user_local_id)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(account_id.to_string())
        .bind(card.to_string())
        .bind(user.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn unlink_user(
        &self,
        account_id: AccountId,
        card: LocalId,
        user: LocalId,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            DELETE FROM card_users
            WHERE account_id = ? AND card_local_id = ? AND user_local_id = ?
            "#,
        )
        .bind(account_id.to_string())
        .bind(card.to_string())
        .bind(user.to_string())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn users_for_card(
        &self,
        account_id: AccountId,
        card: LocalId,
    ) -> Result<Vec<LocalId>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT user_local_id FROM card_users
            WHERE account_id = ? AND card_local_id = ?
            "#,
        )
        .bind(account_id.to_string())
        .bind(card.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|r| parse_local_id(&r.get::<String, _>("user_local_id")))
            .collect()
    }
}
