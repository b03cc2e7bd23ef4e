//! Append-only push-attempt log (spec §6: `push_logs`). One row per
//! webhook-dispatch attempt, written by the push worker regardless of
//! outcome. Modeled on [`crate::audit`]'s append/for_job split.

use docpipe_types::webhook::PushLog;
use docpipe_utils::{DocpipeError, Result};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

pub async fn append(pool: &SqlitePool, log: &PushLog) -> Result<()> {
    let headers_text = serde_json::to_string(&log.request_headers)
        .map_err(|e| DocpipeError::Store(format!("push log header serialization: {e}")))?;
    sqlx::query(
        "INSERT INTO push_logs (job_id, webhook_id, http_status, request_headers, \
         request_body, response_body, duration_ms, retry_count, error, save_mode, \
         is_degraded, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )
    .bind(&log.job_id)
    .bind(&log.webhook_id)
    .bind(log.http_status.map(i64::from))
    .bind(headers_text)
    .bind(&log.request_body)
    .bind(&log.response_body)
    .bind(i64::try_from(log.duration_ms).unwrap_or(i64::MAX))
    .bind(i64::from(log.retry_count))
    .bind(&log.error)
    .bind(&log.save_mode)
    .bind(log.is_degraded)
    .bind(log.created_at.to_rfc3339())
    .execute(pool)
    .await
    .map_err(|e| DocpipeError::Store(e.to_string()))?;
    Ok(())
}

pub async fn for_job(pool: &SqlitePool, job_id: &str) -> Result<Vec<PushLog>> {
    let rows = sqlx::query(
        "SELECT job_id, webhook_id, http_status, request_headers, request_body, \
         response_body, duration_ms, retry_count, error, save_mode, is_degraded, created_at \
         FROM push_logs WHERE job_id = ?1 ORDER BY id ASC",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await
    .map_err(|e| DocpipeError::Store(e.to_string()))?;

    rows.into_iter()
        .map(|row| {
            let headers_text: String = row.get("request_headers");
            let request_headers: HashMap<String, String> = serde_json::from_str(&headers_text)
                .map_err(|e| DocpipeError::Store(format!("corrupt push log headers: {e}")))?;
            let created_at = chrono::DateTime::parse_from_rfc3339(&row.get::<String, _>("created_at"))
                .map_err(|e| DocpipeError::Store(format!("corrupt push log timestamp: {e}")))?
                .with_timezone(&chrono::Utc);
            Ok(PushLog {
                job_id: row.get("job_id"),
                webhook_id: row.get("webhook_id"),
                http_status: row.get::<Option<i64>, _>("http_status").map(|v| v as u16),
                request_headers,
                request_body: row.get("request_body"),
                response_body: row.get("response_body"),
                duration_ms: row.get::<i64, _>("duration_ms").max(0) as u64,
                retry_count: row.get::<i64, _>("retry_count").max(0) as u32,
                error: row.get("error"),
                save_mode: row.get("save_mode"),
                is_degraded: row.get("is_degraded"),
                created_at,
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

    fn sample() -> PushLog {
        PushLog {
            job_id: "j1".into(),
            webhook_id: "wh1".into(),
            http_status: Some(200),
            request_headers: HashMap::from([("Content-Type".to_string(), "application/json".to_string())]),
            request_body: "{}".into(),
            response_body: Some("ok".into()),
            duration_ms: 42,
            retry_count: 0,
            error: None,
            save_mode: None,
            is_degraded: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn append_and_read_back() {
        let pool = pool().await;
        append(&pool, &sample()).await.unwrap();
        let logs = for_job(&pool, "j1").await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].http_status, Some(200));
        assert_eq!(logs[0].request_headers.get("Content-Type").unwrap(), "application/json");
    }
}
