//! # Notification Outbox Repository
//!
//! Queue for the delivery/notification collaborator.
//!
//! ## The Outbox Pattern
//! An order confirmation is inserted in the SAME transaction that
//! commits the order, so a confirmed order always has a notification
//! row and a rolled-back checkout leaves none. A delivery worker outside
//! this core drains pending rows and marks them delivered or failed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use crate::repository::new_id;

/// An entry in the notification outbox queue.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OutboxEntry {
    pub id: String,
    /// Type of entity being announced: "ORDER" today.
    pub entity_type: String,
    /// ID of the entity being announced.
    pub entity_id: String,
    /// The full entity data as JSON.
    pub payload: String,
    /// Number of delivery attempts.
    pub attempts: i64,
    /// Last error message if delivery failed.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub attempted_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Repository for notification outbox operations.
#[derive(Debug, Clone)]
pub struct NotificationOutboxRepository {
    pool: SqlitePool,
}

impl NotificationOutboxRepository {
    /// Creates a new NotificationOutboxRepository.
    pub fn new(pool: SqlitePool) -> Self {
        NotificationOutboxRepository { pool }
    }

    /// Queues an entity announcement inside the caller's transaction.
    pub(crate) async fn queue_with(
        conn: &mut SqliteConnection,
        entity_type: &str,
        entity_id: &str,
        payload: &str,
    ) -> DbResult<OutboxEntry> {
        let now = Utc::now();
        let entry = OutboxEntry {
            id: new_id(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            payload: payload.to_string(),
            attempts: 0,
            last_error: None,
            created_at: now,
            attempted_at: None,
            delivered_at: None,
        };

        debug!(entity_type = %entity_type, entity_id = %entity_id, "Queuing notification");

        sqlx::query(
            r#"
            INSERT INTO notification_outbox (
                id, entity_type, entity_id, payload,
                attempts, last_error, created_at, attempted_at, delivered_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.payload)
        .bind(entry.attempts)
        .bind(&entry.last_error)
        .bind(entry.created_at)
        .bind(entry.attempted_at)
        .bind(entry.delivered_at)
        .execute(conn)
        .await?;

        Ok(entry)
    }

    /// Gets pending entries, oldest first.
    pub async fn pending(&self, limit: u32) -> DbResult<Vec<OutboxEntry>> {
        let entries = sqlx::query_as::<_, OutboxEntry>(
            r#"
            SELECT id, entity_type, entity_id, payload,
                   attempts, last_error, created_at, attempted_at, delivered_at
            FROM notification_outbox
            WHERE delivered_at IS NULL
            ORDER BY created_at ASC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Marks an entry as successfully delivered.
    pub async fn mark_delivered(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE notification_outbox
            SET delivered_at = ?2, attempted_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a delivery failure.
    pub async fn mark_failed(&self, id: &str, error: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            UPDATE notification_outbox
            SET attempts = attempts + 1, last_error = ?2, attempted_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Counts undelivered entries.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notification_outbox WHERE delivered_at IS NULL",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Deletes delivered entries older than the given number of days.
    pub async fn cleanup_delivered(&self, days_old: u32) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM notification_outbox
            WHERE delivered_at IS NOT NULL
            AND delivered_at < datetime('now', '-' || ?1 || ' days')
            "#,
        )
        .bind(days_old)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing::test_db;

    #[tokio::test]
    async fn test_queue_and_drain() {
        let db = test_db().await;

        let mut tx = db.pool().begin().await.unwrap();
        let entry =
            NotificationOutboxRepository::queue_with(&mut tx, "ORDER", "o1", r#"{"id":"o1"}"#)
                .await
                .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(db.outbox().count_pending().await.unwrap(), 1);

        let pending = db.outbox().pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entity_id, "o1");

        db.outbox().mark_delivered(&entry.id).await.unwrap();
        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rollback_leaves_no_entry() {
        let db = test_db().await;

        let mut tx = db.pool().begin().await.unwrap();
        NotificationOutboxRepository::queue_with(&mut tx, "ORDER", "o1", "{}")
            .await
            .unwrap();
        drop(tx); // rollback

        assert_eq!(db.outbox().count_pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_failed_tracks_attempts() {
        let db = test_db().await;

        let mut tx = db.pool().begin().await.unwrap();
        let entry = NotificationOutboxRepository::queue_with(&mut tx, "ORDER", "o1", "{}")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        db.outbox().mark_failed(&entry.id, "smtp timeout").await.unwrap();

        let pending = db.outbox().pending(10).await.unwrap();
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("smtp timeout"));
    }
}
