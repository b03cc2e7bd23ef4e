//! SQLite schema for the job store. Jobs are kept as a single JSON
//! snapshot column alongside a handful of indexed scalar columns used
//! for dedup lookup and status queries — the same "one JSON blob plus
//! indexed metadata" shape `xchecker-engine`'s workspace registry uses
//! for its on-disk `workspace.yaml`, just moved into a row.

use docpipe_utils::{DocpipeError, Result};
use sqlx::SqlitePool;

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            rule_id TEXT NOT NULL,
            rule_version TEXT NOT NULL,
            created_at TEXT NOT NULL,
            job_json TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DocpipeError::Store(e.to_string()))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs (status)")
        .execute(pool)
        .await
        .map_err(|e| DocpipeError::Store(e.to_string()))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dedup_index (
            content_hash TEXT NOT NULL,
            rule_id TEXT NOT NULL,
            rule_version TEXT NOT NULL,
            job_id TEXT NOT NULL,
            PRIMARY KEY (content_hash, rule_id, rule_version)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DocpipeError::Store(e.to_string()))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id TEXT NOT NULL,
            auditor_id TEXT NOT NULL,
            action TEXT NOT NULL,
            detail TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DocpipeError::Store(e.to_string()))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_log_job ON audit_log (job_id)")
        .execute(pool)
        .await
        .map_err(|e| DocpipeError::Store(e.to_string()))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS push_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id TEXT NOT NULL,
            webhook_id TEXT NOT NULL,
            http_status INTEGER,
            request_headers TEXT NOT NULL,
            request_body TEXT NOT NULL,
            response_body TEXT,
            duration_ms INTEGER NOT NULL,
            retry_count INTEGER NOT NULL,
            error TEXT,
            save_mode TEXT,
            is_degraded INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DocpipeError::Store(e.to_string()))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_push_logs_job ON push_logs (job_id)")
        .execute(pool)
        .await
        .map_err(|e| DocpipeError::Store(e.to_string()))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_executions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id TEXT NOT NULL,
            rule_id TEXT NOT NULL,
            input_snapshot TEXT NOT NULL,
            output_snapshot TEXT,
            stdout TEXT NOT NULL,
            stderr TEXT NOT NULL,
            duration_ms INTEGER NOT NULL,
            status TEXT NOT NULL,
            error_message TEXT,
            retry_count INTEGER NOT NULL,
            executed_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DocpipeError::Store(e.to_string()))?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_pipeline_executions_job ON pipeline_executions (job_id)",
    )
    .execute(pool)
    .await
    .map_err(|e| DocpipeError::Store(e.to_string()))?;

    Ok(())
}
