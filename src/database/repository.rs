//! Repository layer for database operations
//!
//! Item writes commit together with their outbox entry in one transaction,
//! so a crash can never lose a queued push for a saved change. Remote
//! changes are applied through the `apply_remote_*` methods, which bypass
//! the outbox so mirrored changes are never echoed back to the cloud.

use super::models::*;
use crate::error::Result;
use sqlx::SqlitePool;

/// Repository for item, outbox, and sync-state operations
#[derive(Clone)]
pub struct ItemRepository {
    pool: SqlitePool,
}

impl ItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace an item and queue a push for it.
    ///
    /// `created_at` of an existing row is preserved; every other column is
    /// overwritten. Returns the stored row.
    pub async fn put_item(&self, item: &Item) -> Result<Item> {
        let labels_json = serde_json::to_string(&item.labels)?;
        let mut tx = self.pool.begin().await?;

        let stored = sqlx::query_as::<_, Item>(
            r#"
            INSERT INTO items (
                id, name, description, created_at, updated_at, labels,
                image_url, audio_url, audio_transcription,
                latitude, longitude, location_name
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                updated_at = excluded.updated_at,
                labels = excluded.labels,
                image_url = excluded.image_url,
                audio_url = excluded.audio_url,
                audio_transcription = excluded.audio_transcription,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                location_name = excluded.location_name
            RETURNING *
            "#,
        )
        .bind(&item.id)
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.created_at)
        .bind(item.updated_at)
        .bind(&labels_json)
        .bind(&item.image_url)
        .bind(&item.audio_url)
        .bind(&item.audio_transcription)
        .bind(item.latitude)
        .bind(item.longitude)
        .bind(&item.location_name)
        .fetch_one(&mut *tx)
        .await?;

        let payload = serde_json::to_string(&stored)?;
        queue_push(&mut tx, &stored.id, OutboxOp::Upsert, Some(&payload)).await?;

        tx.commit().await?;

        tracing::debug!("Stored item: {}", stored.id);
        Ok(stored)
    }

    /// Get an item by ID
    pub async fn get_item(&self, id: &str) -> Result<Option<Item>> {
        let item = sqlx::query_as::<_, Item>(
            r#"
            SELECT * FROM items WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(item)
    }

    /// List all items, newest first.
    /// Ties on `created_at` fall back to insertion order, still newest first.
    pub async fn list_items(&self) -> Result<Vec<Item>> {
        let items = sqlx::query_as::<_, Item>(
            r#"
            SELECT * FROM items ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(items)
    }

    /// Delete an item and queue a remote delete.
    ///
    /// The push is queued even when no local row existed: the cloud mirror
    /// may still hold a copy this device never saw. Returns whether a local
    /// row was removed.
    pub async fn delete_item(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        queue_push(&mut tx, id, OutboxOp::Delete, None).await?;

        tx.commit().await?;

        tracing::debug!("Deleted item: {} (existed: {})", id, removed);
        Ok(removed)
    }

    /// Apply an item received from the cloud mirror.
    ///
    /// Last write wins: the row is only touched when the incoming copy is
    /// at least as new as the stored one, and an existing row keeps its
    /// `created_at` either way. No push is queued. Returns whether the
    /// incoming copy was applied.
    pub async fn apply_remote_upsert(&self, item: &Item) -> Result<bool> {
        let labels_json = serde_json::to_string(&item.labels)?;

        let rows = sqlx::query(
            r#"
            INSERT INTO items (
                id, name, description, created_at, updated_at, labels,
                image_url, audio_url, audio_transcription,
                latitude, longitude, location_name
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                updated_at = excluded.updated_at,
                labels = excluded.labels,
                image_url = excluded.image_url,
                audio_url = excluded.audio_url,
                audio_transcription = excluded.audio_transcription,
                latitude = excluded.latitude,
                longitude = excluded.longitude,
                location_name = excluded.location_name
            WHERE excluded.updated_at >= items.updated_at
            "#,
        )
        .bind(&item.id)
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.created_at)
        .bind(item.updated_at)
        .bind(&labels_json)
        .bind(&item.image_url)
        .bind(&item.audio_url)
        .bind(&item.audio_transcription)
        .bind(item.latitude)
        .bind(item.longitude)
        .bind(&item.location_name)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows > 0)
    }

    /// Apply a delete received from the cloud mirror. No push is queued.
    pub async fn apply_remote_delete(&self, id: &str) -> Result<bool> {
        let rows = sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(rows > 0)
    }

    /// Queued pushes, oldest first
    pub async fn pending_outbox(&self, limit: i64) -> Result<Vec<OutboxEntry>> {
        let entries = sqlx::query_as::<_, OutboxEntry>(
            r#"
            SELECT * FROM outbox ORDER BY seq ASC LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Remove a queued push after successful delivery
    pub async fn remove_outbox_entry(&self, seq: i64) -> Result<()> {
        sqlx::query("DELETE FROM outbox WHERE seq = ?")
            .bind(seq)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Count a failed delivery attempt on a queued push
    pub async fn record_outbox_attempt(&self, seq: i64) -> Result<()> {
        sqlx::query("UPDATE outbox SET attempts = attempts + 1 WHERE seq = ?")
            .bind(seq)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Number of queued pushes
    pub async fn outbox_len(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM outbox")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Last acknowledged change-feed cursor for a user, 0 if none
    pub async fn sync_cursor(&self, user_id: &str) -> Result<i64> {
        let cursor: Option<i64> = sqlx::query_scalar("SELECT cursor FROM sync_state WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(cursor.unwrap_or(0))
    }

    /// Persist the change-feed cursor for a user
    pub async fn set_sync_cursor(&self, user_id: &str, cursor: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (user_id, cursor, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                cursor = excluded.cursor,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(cursor)
        .bind(now_ms())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Replace any queued pushes for an item with a single new entry.
/// Pushes coalesce per item: only the latest state matters to the mirror.
async fn queue_push(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    item_id: &str,
    op: OutboxOp,
    payload: Option<&str>,
) -> Result<()> {
    sqlx::query("DELETE FROM outbox WHERE item_id = ?")
        .bind(item_id)
        .execute(&mut **tx)
        .await?;

    sqlx::query("INSERT INTO outbox (item_id, op, payload, queued_at) VALUES (?, ?, ?, ?)")
        .bind(item_id)
        .bind(op)
        .bind(payload)
        .bind(now_ms())
        .execute(&mut **tx)
        .await?;

    Ok(())
}
