//! Job store: compare-and-swap status transitions plus the dedup index
//! that lets an identical `(content_hash, rule_id, rule_version)` upload
//! skip straight to a prior terminal extraction ("instant clone").

use docpipe_types::job::{Job, JobStatus};
use docpipe_utils::{DocpipeError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

#[derive(Clone)]
pub struct JobStore {
    pool: SqlitePool,
}

fn row_to_job(payload: &str) -> Result<Job> {
    serde_json::from_str(payload).map_err(|e| DocpipeError::Store(format!("corrupt job row: {e}")))
}

fn hash_hex(hash: &[u8; 32]) -> String {
    hash.iter().map(|b| format!("{b:02x}")).collect()
}

impl JobStore {
    pub async fn connect(dsn: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(dsn)
            .map_err(|e| DocpipeError::Store(format!("invalid store dsn: {e}")))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .map_err(|e| DocpipeError::Store(e.to_string()))?;
        crate::schema::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Persist a freshly created job (must be `Queued`).
    pub async fn insert_queued(&self, job: &Job) -> Result<()> {
        let job_json = serde_json::to_string(job)
            .map_err(|e| DocpipeError::Store(format!("job serialization: {e}")))?;
        sqlx::query(
            "INSERT INTO jobs (id, status, content_hash, rule_id, rule_version, created_at, job_json) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&job.id)
        .bind(job.status.as_str())
        .bind(hash_hex(&job.content_hash))
        .bind(&job.rule.rule_id)
        .bind(&job.rule.rule_version)
        .bind(job.created_at.to_rfc3339())
        .bind(job_json)
        .execute(&self.pool)
        .await
        .map_err(|e| DocpipeError::Store(e.to_string()))?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Job>> {
        let row = sqlx::query("SELECT job_json FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DocpipeError::Store(e.to_string()))?;
        row.map(|r| row_to_job(&r.get::<String, _>("job_json")))
            .transpose()
    }

    /// Compare-and-swap a job's status: the current row must be in
    /// `expected`, and `expected -> next` must be a legal transition
    /// (or one of the explicit retry/cancel moves), else this returns
    /// `DocpipeError::StatusGuard` and the row is untouched. `mutate` is
    /// applied to the in-memory job (to set extracted fields, errors,
    /// timestamps, etc.) before `status` is overwritten with `next` and
    /// the row is written back, all inside one transaction.
    pub async fn transition<F>(
        &self,
        id: &str,
        expected: JobStatus,
        next: JobStatus,
        mutate: F,
    ) -> Result<Job>
    where
        F: FnOnce(&mut Job),
    {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DocpipeError::Store(e.to_string()))?;

        let row = sqlx::query("SELECT job_json FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| DocpipeError::Store(e.to_string()))?
            .ok_or_else(|| DocpipeError::Store(format!("job {id} not found")))?;

        let mut job = row_to_job(&row.get::<String, _>("job_json"))?;

        if job.status != expected {
            return Err(DocpipeError::StatusGuard {
                job_id: id.to_string(),
                expected: expected.as_str().to_string(),
                actual: job.status.as_str().to_string(),
            });
        }
        if !job.status.can_transition_to(next) {
            return Err(DocpipeError::StatusGuard {
                job_id: id.to_string(),
                expected: format!("a status {} can move to", next.as_str()),
                actual: job.status.as_str().to_string(),
            });
        }

        mutate(&mut job);
        job.status = next;

        let job_json = serde_json::to_string(&job)
            .map_err(|e| DocpipeError::Store(format!("job serialization: {e}")))?;
        sqlx::query("UPDATE jobs SET status = ?1, job_json = ?2 WHERE id = ?3")
            .bind(job.status.as_str())
            .bind(job_json)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DocpipeError::Store(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| DocpipeError::Store(e.to_string()))?;

        Ok(job)
    }

    /// Requeue a `failed`/`rejected` job back to `queued`, ignoring the
    /// ordinary forward-only transition table (this is the explicit
    /// operator retry action).
    pub async fn requeue(&self, id: &str) -> Result<Job> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DocpipeError::Store(e.to_string()))?;
        let row = sqlx::query("SELECT job_json FROM jobs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| DocpipeError::Store(e.to_string()))?
            .ok_or_else(|| DocpipeError::Store(format!("job {id} not found")))?;
        let mut job = row_to_job(&row.get::<String, _>("job_json"))?;
        if !job.status.can_requeue_from() {
            return Err(DocpipeError::StatusGuard {
                job_id: id.to_string(),
                expected: "failed or rejected".to_string(),
                actual: job.status.as_str().to_string(),
            });
        }
        job.status = JobStatus::Queued;
        job.last_error = None;
        let job_json = serde_json::to_string(&job)
            .map_err(|e| DocpipeError::Store(format!("job serialization: {e}")))?;
        sqlx::query("UPDATE jobs SET status = ?1, job_json = ?2 WHERE id = ?3")
            .bind(job.status.as_str())
            .bind(job_json)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| DocpipeError::Store(e.to_string()))?;
        tx.commit()
            .await
            .map_err(|e| DocpipeError::Store(e.to_string()))?;
        Ok(job)
    }

    /// Record that `job_id` is an instant-clone source for future
    /// identical uploads under the same rule version. Called once a job
    /// reaches `pending_audit` or `completed` (extraction succeeded).
    pub async fn record_dedup_source(&self, job: &Job) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO dedup_index (content_hash, rule_id, rule_version, job_id) \
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(hash_hex(&job.content_hash))
        .bind(&job.rule.rule_id)
        .bind(&job.rule.rule_version)
        .bind(&job.id)
        .execute(&self.pool)
        .await
        .map_err(|e| DocpipeError::Store(e.to_string()))?;
        Ok(())
    }

    /// Find a prior job whose extraction can be cloned for an identical
    /// `(content_hash, rule_id, rule_version)` upload.
    pub async fn find_dedup_source(
        &self,
        content_hash: &[u8; 32],
        rule_id: &str,
        rule_version: &str,
    ) -> Result<Option<Job>> {
        let row = sqlx::query(
            "SELECT job_id FROM dedup_index \
             WHERE content_hash = ?1 AND rule_id = ?2 AND rule_version = ?3",
        )
        .bind(hash_hex(content_hash))
        .bind(rule_id)
        .bind(rule_version)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DocpipeError::Store(e.to_string()))?;
        match row {
            None => Ok(None),
            Some(row) => self.get(&row.get::<String, _>("job_id")).await,
        }
    }

    pub async fn append_audit_log(&self, entry: &crate::audit::AuditLogEntry) -> Result<()> {
        crate::audit::append(&self.pool, entry).await
    }

    pub async fn audit_log_for_job(&self, job_id: &str) -> Result<Vec<crate::audit::AuditLogEntry>> {
        crate::audit::for_job(&self.pool, job_id).await
    }

    pub async fn record_push_log(&self, log: &docpipe_types::webhook::PushLog) -> Result<()> {
        crate::push_log::append(&self.pool, log).await
    }

    pub async fn push_logs_for_job(&self, job_id: &str) -> Result<Vec<docpipe_types::webhook::PushLog>> {
        crate::push_log::for_job(&self.pool, job_id).await
    }

    pub async fn record_pipeline_execution(
        &self,
        execution: &docpipe_types::pipeline::PipelineExecution,
    ) -> Result<()> {
        crate::pipeline_execution::append(&self.pool, execution).await
    }

    pub async fn pipeline_executions_for_job(
        &self,
        job_id: &str,
    ) -> Result<Vec<docpipe_types::pipeline::PipelineExecution>> {
        crate::pipeline_execution::for_job(&self.pool, job_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use docpipe_types::job::RuleRef;

    fn sample_job(id: &str, hash: [u8; 32]) -> Job {
        Job::new_queued(
            id,
            "invoice.pdf",
            format!("2026/01/01/{id}/invoice.pdf"),
            hash,
            1,
            RuleRef {
                rule_id: "rule-1".into(),
                rule_version: "V1.0".into(),
            },
            Utc::now(),
        )
    }

    async fn store() -> JobStore {
        JobStore::connect("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn insert_and_get_roundtrip() {
        let store = store().await;
        let job = sample_job("j1", [1u8; 32]);
        store.insert_queued(&job).await.unwrap();
        let fetched = store.get("j1").await.unwrap().unwrap();
        assert_eq!(fetched.id, "j1");
        assert_eq!(fetched.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn transition_enforces_cas_guard() {
        let store = store().await;
        let job = sample_job("j2", [2u8; 32]);
        store.insert_queued(&job).await.unwrap();

        let result = store
            .transition(
                "j2",
                JobStatus::Processing, // wrong expected status
                JobStatus::Completed,
                |_| {},
            )
            .await;
        assert!(matches!(result, Err(DocpipeError::StatusGuard { .. })));

        let updated = store
            .transition("j2", JobStatus::Queued, JobStatus::Processing, |job| {
                job.started_at = Some(Utc::now());
            })
            .await
            .unwrap();
        assert_eq!(updated.status, JobStatus::Processing);
        assert!(updated.started_at.is_some());
    }

    #[tokio::test]
    async fn transition_rejects_illegal_jump() {
        let store = store().await;
        let job = sample_job("j3", [3u8; 32]);
        store.insert_queued(&job).await.unwrap();
        let result = store
            .transition("j3", JobStatus::Queued, JobStatus::Pushing, |_| {})
            .await;
        assert!(matches!(result, Err(DocpipeError::StatusGuard { .. })));
    }

    #[tokio::test]
    async fn dedup_index_records_and_finds_source() {
        let store = store().await;
        let mut job = sample_job("j4", [4u8; 32]);
        job.status = JobStatus::Completed;
        store.insert_queued(&job).await.unwrap();
        store.record_dedup_source(&job).await.unwrap();

        let found = store
            .find_dedup_source(&[4u8; 32], "rule-1", "V1.0")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "j4");

        let missing = store
            .find_dedup_source(&[9u8; 32], "rule-1", "V1.0")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn requeue_from_failed_resets_to_queued() {
        let store = store().await;
        let mut job = sample_job("j5", [5u8; 32]);
        job.status = JobStatus::Failed;
        job.last_error = Some("boom".into());
        store.insert_queued(&job).await.unwrap();

        let requeued = store.requeue("j5").await.unwrap();
        assert_eq!(requeued.status, JobStatus::Queued);
        assert!(requeued.last_error.is_none());
    }
}
