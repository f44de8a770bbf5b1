//! SQLite implementation of the identity map port
//!
//! The identity map table is keyed on `(account_id, kind, local_id)` with a
//! uniqueness constraint on `(account_id, kind, remote_id)` so a remote id
//! can never map to two local rows. Status transitions go through the
//! domain state machine before touching the table; an illegal transition
//! never reaches SQL.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, Transaction};

use deckhand_core::domain::{
    AccountId, EntityKind, Etag, IdentityEntry, LocalId, RemoteId, SyncStatus,
};
use deckhand_core::ports::{Change, ChangeEvent, IdentityMap, StoreError};

use crate::repository::{db_err, parse_account_id, parse_datetime, parse_local_id, SqliteStore};

// ============================================================================
// Helper functions
// ============================================================================

fn status_to_string(status: SyncStatus) -> &'static str {
    match status {
        SyncStatus::Clean => "clean",
        SyncStatus::Dirty => "dirty",
        SyncStatus::Pushing => "pushing",
        SyncStatus::Conflicted => "conflicted",
        SyncStatus::Deleted => "deleted",
    }
}

fn status_from_string(s: &str) -> Result<SyncStatus, StoreError> {
    match s {
        "clean" => Ok(SyncStatus::Clean),
        "dirty" => Ok(SyncStatus::Dirty),
        "pushing" => Ok(SyncStatus::Pushing),
        "conflicted" => Ok(SyncStatus::Conflicted),
        "deleted" => Ok(SyncStatus::Deleted),
        other => Err(StoreError::Database(anyhow::anyhow!(
            "Unknown sync status: {}",
            other
        ))),
    }
}

fn kind_from_string(s: &str) -> Result<EntityKind, StoreError> {
    match s {
        "board" => Ok(EntityKind::Board),
        "label" => Ok(EntityKind::Label),
        "stack" => Ok(EntityKind::Stack),
        "card" => Ok(EntityKind::Card),
        "user" => Ok(EntityKind::User),
        "comment" => Ok(EntityKind::Comment),
        "attachment" => Ok(EntityKind::Attachment),
        other => Err(StoreError::Database(anyhow::anyhow!(
            "Unknown entity kind: {}",
            other
        ))),
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<IdentityEntry, StoreError> {
    let remote_id = row
        .get::<Option<i64>, _>("remote_id")
        .map(RemoteId::new)
        .transpose()
        .map_err(StoreError::Domain)?;
    let etag = row
        .get::<Option<String>, _>("etag")
        .map(Etag::new)
        .transpose()
        .map_err(StoreError::Domain)?;

    Ok(IdentityEntry {
        account_id: parse_account_id(&row.get::<String, _>("account_id"))?,
        kind: kind_from_string(&row.get::<String, _>("kind"))?,
        local_id: parse_local_id(&row.get::<String, _>("local_id"))?,
        remote_id,
        etag,
        status: status_from_string(&row.get::<String, _>("status"))?,
        updated_at: parse_datetime(&row.get::<String, _>("updated_at"))?,
    })
}

/// Upserts a full identity entry within an open transaction
///
/// Shared with the repository's `save_with_entry` so both writes land in
/// the same transaction.
pub(crate) async fn upsert_entry(
    tx: &mut Transaction<'_, Sqlite>,
    entry: &IdentityEntry,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO identity_map (account_id, kind, local_id, remote_id, etag,
                                  status, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (account_id, kind, local_id) DO UPDATE SET
            remote_id = excluded.remote_id,
            etag = excluded.etag,
            status = excluded.status,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(entry.account_id.to_string())
    .bind(entry.kind.as_str())
    .bind(entry.local_id.to_string())
    .bind(entry.remote_id.map(|r| r.as_i64()))
    .bind(entry.etag.as_ref().map(|e| e.as_str().to_string()))
    .bind(status_to_string(entry.status))
    .bind(entry.updated_at.to_rfc3339())
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(())
}

impl SqliteStore {
    /// Loads an entry or fails with NotFound
    async fn require_entry(
        &self,
        account_id: AccountId,
        kind: EntityKind,
        local_id: LocalId,
    ) -> Result<IdentityEntry, StoreError> {
        self.entry(account_id, kind, local_id)
            .await?
            .ok_or_else(|| StoreError::not_found(kind, local_id))
    }

    /// Applies a validated transition and persists the changed entry
    async fn apply_transition(
        &self,
        account_id: AccountId,
        kind: EntityKind,
        local_id: LocalId,
        target: SyncStatus,
    ) -> Result<(), StoreError> {
        let mut entry = self.require_entry(account_id, kind, local_id).await?;
        entry.transition(target)?;

        let mut tx = self.pool().begin().await.map_err(db_err)?;
        upsert_entry(&mut tx, &entry).await?;
        tx.commit().await.map_err(db_err)?;

        self.publish(ChangeEvent::Entity {
            account_id,
            kind,
            local_id,
            change: Change::StatusChanged(target),
        });
        Ok(())
    }
}

// ============================================================================
// IdentityMap implementation
// ============================================================================

#[async_trait]
impl IdentityMap for SqliteStore {
    async fn insert(&self, entry: &IdentityEntry) -> Result<(), StoreError> {
        let mut tx = self.pool().begin().await.map_err(db_err)?;
        upsert_entry(&mut tx, entry).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn entry(
        &self,
        account_id: AccountId,
        kind: EntityKind,
        local_id: LocalId,
    ) -> Result<Option<IdentityEntry>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM identity_map
            WHERE account_id = ? AND kind = ? AND local_id = ?
            "#,
        )
        .bind(account_id.to_string())
        .bind(kind.as_str())
        .bind(local_id.to_string())
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        row.map(|r| entry_from_row(&r)).transpose()
    }

    async fn resolve_remote(
        &self,
        account_id: AccountId,
        kind: EntityKind,
        remote_id: RemoteId,
    ) -> Result<Option<IdentityEntry>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM identity_map
            WHERE account_id = ? AND kind = ? AND remote_id = ?
            "#,
        )
        .bind(account_id.to_string())
        .bind(kind.as_str())
        .bind(remote_id.as_i64())
        .fetch_optional(self.pool())
        .await
        .map_err(db_err)?;

        row.map(|r| entry_from_row(&r)).transpose()
    }

    async fn mark_dirty(
        &self,
        account_id: AccountId,
        kind: EntityKind,
        local_id: LocalId,
    ) -> Result<(), StoreError> {
        // Re-editing an already dirty entity is a no-op, not a violation.
        let entry = self.require_entry(account_id, kind, local_id).await?;
        if entry.status == SyncStatus::Dirty {
            return Ok(());
        }
        self.apply_transition(account_id, kind, local_id, SyncStatus::Dirty)
            .await
    }

    async fn mark_pushing(
        &self,
        account_id: AccountId,
        kind: EntityKind,
        local_id: LocalId,
    ) -> Result<(), StoreError> {
        self.apply_transition(account_id, kind, local_id, SyncStatus::Pushing)
            .await
    }

    async fn mark_synced(
        &self,
        account_id: AccountId,
        kind: EntityKind,
        local_id: LocalId,
        remote_id: RemoteId,
        etag: Option<Etag>,
    ) -> Result<(), StoreError> {
        let mut entry = self.require_entry(account_id, kind, local_id).await?;
        entry.record_synced(remote_id, etag)?;

        let mut tx = self.pool().begin().await.map_err(db_err)?;
        upsert_entry(&mut tx, &entry).await?;
        tx.commit().await.map_err(db_err)?;

        self.publish(ChangeEvent::Entity {
            account_id,
            kind,
            local_id,
            change: Change::StatusChanged(SyncStatus::Clean),
        });
        Ok(())
    }

    async fn mark_conflicted(
        &self,
        account_id: AccountId,
        kind: EntityKind,
        local_id: LocalId,
    ) -> Result<(), StoreError> {
        self.apply_transition(account_id, kind, local_id, SyncStatus::Conflicted)
            .await
    }

    async fn mark_deleted(
        &self,
        account_id: AccountId,
        kind: EntityKind,
        local_id: LocalId,
    ) -> Result<(), StoreError> {
        self.apply_transition(account_id, kind, local_id, SyncStatus::Deleted)
            .await
    }

    async fn remove(
        &self,
        account_id: AccountId,
        kind: EntityKind,
        local_id: LocalId,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            DELETE FROM identity_map
            WHERE account_id = ? AND kind = ? AND local_id = ?
            "#,
        )
        .bind(account_id.to_string())
        .bind(kind.as_str())
        .bind(local_id.to_string())
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn entries_in_status(
        &self,
        account_id: AccountId,
        kind: EntityKind,
        status: SyncStatus,
    ) -> Result<Vec<IdentityEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM identity_map
            WHERE account_id = ? AND kind = ? AND status = ?
            ORDER BY updated_at
            "#,
        )
        .bind(account_id.to_string())
        .bind(kind.as_str())
        .bind(status_to_string(status))
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        rows.iter().map(entry_from_row).collect()
    }

    async fn known_remote_ids(
        &self,
        account_id: AccountId,
        kind: EntityKind,
    ) -> Result<Vec<(LocalId, RemoteId)>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT local_id, remote_id FROM identity_map
            WHERE account_id = ? AND kind = ? AND remote_id IS NOT NULL
            "#,
        )
        .bind(account_id.to_string())
        .bind(kind.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|r| {
                let local = parse_local_id(&r.get::<String, _>("local_id"))?;
                let remote =
                    RemoteId::new(r.get::<i64, _>("remote_id")).map_err(StoreError::Domain)?;
                Ok((local, remote))
            })
            .collect()
    }
}
