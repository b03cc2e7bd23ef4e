//! `Webhook` and `PushLog` (spec §3, §4.6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookType {
    Generic,
    ErpSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    None,
    Basic,
    Bearer,
    ApiKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveMode {
    Smart,
    SaveOnly,
    DraftOnly,
}

/// A downstream delivery target. Invariant: `ErpSession` webhooks carry
/// no `endpoint_url` (the session target is process-wide config);
/// `Generic` webhooks must have one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Webhook {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: WebhookType,
    pub endpoint_url: Option<String>,
    pub auth_mode: AuthMode,
    /// Encrypted at rest by the store; plaintext only materializes right
    /// before use in `docpipe-webhook`.
    pub auth_secret_encrypted: Option<Vec<u8>>,
    pub signing_secret: Option<String>,
    pub request_template: serde_json::Value,
    pub active: bool,
    pub save_mode: Option<SaveMode>,
}

impl Webhook {
    /// Invariant check for a webhook's endpoint-url shape.
    #[must_use]
    pub fn endpoint_invariant_holds(&self) -> bool {
        match self.kind {
            WebhookType::ErpSession => self.endpoint_url.is_none(),
            WebhookType::Generic => self.endpoint_url.is_some(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushLog {
    pub job_id: String,
    pub webhook_id: String,
    pub http_status: Option<u16>,
    pub request_headers: HashMap<String, String>,
    pub request_body: String,
    pub response_body: Option<String>,
    pub duration_ms: u64,
    pub retry_count: u32,
    pub error: Option<String>,
    pub save_mode: Option<String>,
    pub is_degraded: bool,
    pub created_at: DateTime<Utc>,
}
