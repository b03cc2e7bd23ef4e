//! `Pipeline` (operator script) and `PipelineExecution` (spec §3, §4.5).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub rule_id: String,
    pub script_body: String,
    pub dependencies: Vec<String>,
    /// Identifies the per-rule isolated runtime cache (spec §4.5); a
    /// change to `dependencies` invalidates the cache keyed by this id.
    pub cache_key: String,
    #[serde(with = "humantime_serde_duration")]
    pub timeout: Duration,
    pub memory_limit_mb: u64,
    pub max_retries: u32,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Pipeline {
    #[must_use]
    pub fn default_timeout() -> Duration {
        Duration::from_secs(300)
    }

    #[must_use]
    pub fn default_max_retries() -> u32 {
        1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineExecutionStatus {
    Success,
    Failed,
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineExecution {
    pub job_id: String,
    pub rule_id: String,
    pub input_snapshot: serde_json::Value,
    pub output_snapshot: Option<serde_json::Value>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub status: PipelineExecutionStatus,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub executed_at: DateTime<Utc>,
}

mod humantime_serde_duration {
    use super::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}
