//! Append-only pipeline-execution log (spec §6: `pipeline_executions`).
//! One row per sandbox run, written by the pipeline worker regardless
//! of outcome. Modeled on [`crate::audit`]'s append/for_job split.

use docpipe_types::pipeline::{PipelineExecution, PipelineExecutionStatus};
use docpipe_utils::{DocpipeError, Result};
use sqlx::{Row, SqlitePool};

fn status_str(status: PipelineExecutionStatus) -> &'static str {
    match status {
        PipelineExecutionStatus::Success => "success",
        PipelineExecutionStatus::Failed => "failed",
        PipelineExecutionStatus::Timeout => "timeout",
    }
}

fn parse_status(s: &str) -> PipelineExecutionStatus {
    match s {
        "success" => PipelineExecutionStatus::Success,
        "timeout" => PipelineExecutionStatus::Timeout,
        _ => PipelineExecutionStatus::Failed,
    }
}

pub async fn append(pool: &SqlitePool, execution: &PipelineExecution) -> Result<()> {
    sqlx::query(
        "INSERT INTO pipeline_executions (job_id, rule_id, input_snapshot, output_snapshot, \
         stdout, stderr, duration_ms, status, error_message, retry_count, executed_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )
    .bind(&execution.job_id)
    .bind(&execution.rule_id)
    .bind(execution.input_snapshot.to_string())
    .bind(execution.output_snapshot.as_ref().map(serde_json::Value::to_string))
    .bind(&execution.stdout)
    .bind(&execution.stderr)
    .bind(i64::try_from(execution.duration_ms).unwrap_or(i64::MAX))
    .bind(status_str(execution.status))
    .bind(&execution.error_message)
    .bind(i64::from(execution.retry_count))
    .bind(execution.executed_at.to_rfc3339())
    .execute(pool)
    .await
    .map_err(|e| DocpipeError::Store(e.to_string()))?;
    Ok(())
}

pub async fn for_job(pool: &SqlitePool, job_id: &str) -> Result<Vec<PipelineExecution>> {
    let rows = sqlx::query(
        "SELECT job_id, rule_id, input_snapshot, output_snapshot, stdout, stderr, \
         duration_ms, status, error_message, retry_count, executed_at \
         FROM pipeline_executions WHERE job_id = ?1 ORDER BY id ASC",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await
    .map_err(|e| DocpipeError::Store(e.to_string()))?;

    rows.into_iter()
        .map(|row| {
            let input_snapshot: serde_json::Value =
                serde_json::from_str(&row.get::<String, _>("input_snapshot"))
                    .map_err(|e| DocpipeError::Store(format!("corrupt input snapshot: {e}")))?;
            let output_snapshot = row
                .get::<Option<String>, _>("output_snapshot")
                .map(|text| serde_json::from_str(&text))
                .transpose()
                .map_err(|e| DocpipeError::Store(format!("corrupt output snapshot: {e}")))?;
            let executed_at =
                chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>("executed_at"))
                    .map_err(|e| DocpipeError::Store(format!("corrupt execution timestamp: {e}")))?
                    .with_timezone(&chrono::Utc);
            Ok(PipelineExecution {
                job_id: row.get("job_id"),
                rule_id: row.get("rule_id"),
                input_snapshot,
                output_snapshot,
                stdout: row.get("stdout"),
                stderr: row.get("stderr"),
                duration_ms: row.get::<i64, _>("duration_ms").max(0) as u64,
                status: parse_status(&row.get::<String, _>("status")),
                error_message: row.get("error_message"),
                retry_count: row.get::<i64, _>("retry_count").max(0) as u32,
                executed_at,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        crate::schema::migrate(&pool).await.unwrap();
        pool
    }

    fn sample() -> PipelineExecution {
        PipelineExecution {
            job_id: "j1".into(),
            rule_id: "r1".into(),
            input_snapshot: serde_json::json!({"task_id": "j1"}),
            output_snapshot: Some(serde_json::json!({"ok": true})),
            stdout: String::new(),
            stderr: String::new(),
            duration_ms: 120,
            status: PipelineExecutionStatus::Success,
            error_message: None,
            retry_count: 0,
            executed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn append_and_read_back() {
        let pool = pool().await;
        append(&pool, &sample()).await.unwrap();
        let rows = for_job(&pool, "j1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, PipelineExecutionStatus::Success);
        assert_eq!(rows[0].output_snapshot, Some(serde_json::json!({"ok": true})));
    }
}
