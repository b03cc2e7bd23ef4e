//! The queue fabric: a single SQLite table backing the four durable
//! queues, with delayed visibility and lease-based claims so a crashed
//! worker's messages become reclaimable once its lease expires rather
//! than being lost (generalizing the stale-lock detection in
//! `xchecker-lock` from a single filesystem lock to a leased row).

use crate::message::{QueueMessage, QueueName};
use chrono::{Duration as ChronoDuration, Utc};
use docpipe_utils::{DocpipeError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone)]
pub struct QueueFabric {
    pool: SqlitePool,
}

impl QueueFabric {
    /// Connect to `dsn` (e.g. `sqlite://docpipe.db`), creating the
    /// database file if it does not exist, and run the fabric's schema
    /// migration.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(dsn)
            .map_err(|e| DocpipeError::Queue(format!("invalid queue dsn: {e}")))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(|e| DocpipeError::Queue(e.to_string()))?;
        let fabric = Self { pool };
        fabric.migrate().await?;
        Ok(fabric)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS queue_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                queue TEXT NOT NULL,
                payload TEXT NOT NULL,
                visible_at TEXT NOT NULL,
                lease_owner TEXT,
                lease_expires_at TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DocpipeError::Queue(e.to_string()))?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_queue_messages_queue_visible \
             ON queue_messages (queue, visible_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| DocpipeError::Queue(e.to_string()))?;
        Ok(())
    }

    /// Enqueue `payload` onto `queue`, visible immediately unless
    /// `delay` pushes its visibility into the future.
    pub async fn publish(
        &self,
        queue: QueueName,
        payload: &serde_json::Value,
        delay: Duration,
    ) -> Result<i64> {
        let now = Utc::now();
        let visible_at = now + ChronoDuration::from_std(delay).unwrap_or(ChronoDuration::zero());
        let payload_text = serde_json::to_string(payload)
            .map_err(|e| DocpipeError::Queue(format!("payload serialization: {e}")))?;
        let row = sqlx::query(
            "INSERT INTO queue_messages (queue, payload, visible_at, retry_count, created_at) \
             VALUES (?1, ?2, ?3, 0, ?4) RETURNING id",
        )
        .bind(queue.as_str())
        .bind(payload_text)
        .bind(visible_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DocpipeError::Queue(e.to_string()))?;
        Ok(row.get::<i64, _>("id"))
    }

    /// Atomically claim the oldest visible message on `queue`, leasing
    /// it to `owner` for `lease_duration`. Returns `None` if nothing is
    /// currently visible.
    pub async fn consume(
        &self,
        queue: QueueName,
        owner: &str,
        lease_duration: Duration,
    ) -> Result<Option<QueueMessage>> {
        let now = Utc::now();
        let lease_expires_at =
            now + ChronoDuration::from_std(lease_duration).unwrap_or(ChronoDuration::minutes(5));
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DocpipeError::Queue(e.to_string()))?;
        let row = sqlx::query(
            "SELECT id, payload, retry_count FROM queue_messages \
             WHERE queue = ?1 AND visible_at <= ?2 \
               AND (lease_expires_at IS NULL OR lease_expires_at <= ?2) \
             ORDER BY visible_at ASC, id ASC LIMIT 1",
        )
        .bind(queue.as_str())
        .bind(now.to_rfc3339())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| DocpipeError::Queue(e.to_string()))?;

        let Some(row) = row else {
            tx.commit().await.ok();
            return Ok(None);
        };

        let id: i64 = row.get("id");
        let payload_text: String = row.get("payload");
        let retry_count: i64 = row.get("retry_count");

        sqlx::query(
            "UPDATE queue_messages SET lease_owner = ?1, lease_expires_at = ?2 WHERE id = ?3",
        )
        .bind(owner)
        .bind(lease_expires_at.to_rfc3339())
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| DocpipeError::Queue(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| DocpipeError::Queue(e.to_string()))?;

        let payload: serde_json::Value = serde_json::from_str(&payload_text)
            .map_err(|e| DocpipeError::Queue(format!("payload deserialization: {e}")))?;

        Ok(Some(QueueMessage {
            id,
            queue: queue.as_str().to_string(),
            payload,
            retry_count: retry_count.max(0) as u32,
            lease_owner: Some(owner.to_string()),
        }))
    }

    /// Acknowledge successful processing: delete the message.
    pub async fn ack(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM queue_messages WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| DocpipeError::Queue(e.to_string()))?;
        Ok(())
    }

    /// Negative-acknowledge: release the lease, bump `retry_count`, and
    /// make the message visible again after `delay`.
    pub async fn nack(&self, id: i64, delay: Duration) -> Result<()> {
        let visible_at =
            Utc::now() + ChronoDuration::from_std(delay).unwrap_or(ChronoDuration::zero());
        sqlx::query(
            "UPDATE queue_messages SET lease_owner = NULL, lease_expires_at = NULL, \
             retry_count = retry_count + 1, visible_at = ?1 WHERE id = ?2",
        )
        .bind(visible_at.to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| DocpipeError::Queue(e.to_string()))?;
        Ok(())
    }

    /// Move a message to the dead-letter queue, recording `reason` by
    /// merging it into the payload under `_dlq_reason`.
    pub async fn move_to_dead_letter(&self, id: i64, reason: &str) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DocpipeError::Queue(e.to_string()))?;
        let row = sqlx::query("SELECT payload FROM queue_messages WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| DocpipeError::Queue(e.to_string()))?;
        let Some(row) = row else {
            tx.commit().await.ok();
            return Ok(());
        };
        let payload_text: String = row.get("payload");
        let mut payload: serde_json::Value = serde_json::from_str(&payload_text)
            .map_err(|e| DocpipeError::Queue(format!("payload deserialization: {e}")))?;
        if let Some(obj) = payload.as_object_mut() {
            obj.insert(
                "_dlq_reason".to_string(),
                serde_json::Value::String(reason.to_string()),
            );
        }
        let now = Utc::now();
        sqlx::query(
            "UPDATE queue_messages SET queue = ?1, payload = ?2, visible_at = ?3, \
             lease_owner = NULL, lease_expires_at = NULL WHERE id = ?4",
        )
        .bind(QueueName::DeadLetter.as_str())
        .bind(serde_json::to_string(&payload).unwrap_or(payload_text))
        .bind(now.to_rfc3339())
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| DocpipeError::Queue(e.to_string()))?;
        tx.commit()
            .await
            .map_err(|e| DocpipeError::Queue(e.to_string()))?;
        Ok(())
    }

    /// Count of messages currently sitting in `queue` (visible or not).
    pub async fn depth(&self, queue: QueueName) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM queue_messages WHERE queue = ?1")
            .bind(queue.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DocpipeError::Queue(e.to_string()))?;
        Ok(row.get::<i64, _>("n"))
    }

    /// Delete every message on `queue`. Used by the `docpipe migrate`
    /// reset path and by tests; never invoked from the worker loops.
    pub async fn purge(&self, queue: QueueName) -> Result<u64> {
        let result = sqlx::query("DELETE FROM queue_messages WHERE queue = ?1")
            .bind(queue.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| DocpipeError::Queue(e.to_string()))?;
        Ok(result.rows_affected())
    }
}
