//! Append-only audit log: every human adjudication of a `pending_audit`
//! job is recorded, never mutated. Modeled on `xchecker-receipt`'s
//! append-only phase-receipt writer, moved from files to rows.

use chrono::Utc;
use docpipe_utils::{DocpipeError, Result};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Approved,
    Rejected,
    FieldCorrected,
}

impl AuditAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::FieldCorrected => "field_corrected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub job_id: String,
    pub auditor_id: String,
    pub action: AuditAction,
    pub detail: serde_json::Value,
}

pub async fn append(pool: &SqlitePool, entry: &AuditLogEntry) -> Result<()> {
    let detail_text = serde_json::to_string(&entry.detail)
        .map_err(|e| DocpipeError::Store(format!("audit detail serialization: {e}")))?;
    sqlx::query(
        "INSERT INTO audit_log (job_id, auditor_id, action, detail, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(&entry.job_id)
    .bind(&entry.auditor_id)
    .bind(entry.action.as_str())
    .bind(detail_text)
    .bind(Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .map_err(|e| DocpipeError::Store(e.to_string()))?;
    Ok(())
}

pub async fn for_job(pool: &SqlitePool, job_id: &str) -> Result<Vec<AuditLogEntry>> {
    let rows = sqlx::query(
        "SELECT job_id, auditor_id, action, detail FROM audit_log \
         WHERE job_id = ?1 ORDER BY id ASC",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await
    .map_err(|e| DocpipeError::Store(e.to_string()))?;

    rows.into_iter()
        .map(|row| {
            let action = match row.get::<String, _>("action").as_str() {
                "approved" => AuditAction::Approved,
                "rejected" => AuditAction::Rejected,
                _ => AuditAction::FieldCorrected,
            };
            let detail: serde_json::Value = serde_json::from_str(&row.get::<String, _>("detail"))
                .map_err(|e| DocpipeError::Store(format!("corrupt audit detail: {e}")))?;
            Ok(AuditLogEntry {
                job_id: row.get("job_id"),
                auditor_id: row.get("auditor_id"),
                action,
                detail,
            })
        })
        .collect()
}
