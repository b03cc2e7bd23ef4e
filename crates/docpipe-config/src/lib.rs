//! Layered runtime configuration: defaults -> TOML file -> environment
//! variable overrides. Modeled on `xchecker-config`'s config-layer split.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which OCR backend the engine dispatches to (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OcrBackendKind {
    /// Local CNN-style detector/recognizer; not thread-safe.
    #[default]
    LocalCnn,
    /// Image-to-text CLI wrapper (subprocess).
    Cli,
    /// HTTP-service wrapper.
    Http,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OcrConfig {
    #[serde(default)]
    pub backend: OcrBackendKind,
    pub fallback_backend: Option<OcrBackendKind>,
    #[serde(default = "default_ocr_parallelism")]
    pub parallelism: usize,
    #[serde(default = "default_page_separator")]
    pub page_separator: String,
    pub cli_path: Option<PathBuf>,
    pub http_endpoint: Option<String>,
}

fn default_ocr_parallelism() -> usize {
    4
}

fn default_page_separator() -> String {
    "\n".to_string()
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            backend: OcrBackendKind::default(),
            fallback_backend: None,
            parallelism: default_ocr_parallelism(),
            page_separator: default_page_separator(),
            cli_path: None,
            http_endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_key_env: String,
    pub model: String,
    pub vision_model: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_breaker_failure_threshold")]
    pub breaker_failure_threshold: u32,
    #[serde(default = "default_breaker_half_open_secs")]
    pub breaker_half_open_secs: u64,
}

fn default_llm_timeout_secs() -> u64 {
    60
}

fn default_breaker_failure_threshold() -> u32 {
    5
}

fn default_breaker_half_open_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// SQLite DSN backing all four queues, e.g. `sqlite://docpipe.db`.
    #[serde(default = "default_queue_dsn")]
    pub dsn: String,
    #[serde(default = "default_queue_ttl_secs")]
    pub ttl_secs: u64,
    #[serde(default = "default_queue_max_len")]
    pub max_len: u64,
}

fn default_queue_dsn() -> String {
    "sqlite://docpipe.db".to_string()
}

fn default_queue_ttl_secs() -> u64 {
    3600
}

fn default_queue_max_len() -> u64 {
    10_000
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            dsn: default_queue_dsn(),
            ttl_secs: default_queue_ttl_secs(),
            max_len: default_queue_max_len(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PushConfig {
    #[serde(default = "default_push_retry_delays")]
    pub retry_delays_secs: Vec<u64>,
    #[serde(default = "default_push_retry_max")]
    pub retry_max: u32,
    #[serde(default = "default_push_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_presign_ttl_secs")]
    pub presign_ttl_secs: u64,
}

fn default_push_retry_delays() -> Vec<u64> {
    vec![10, 30, 90]
}

fn default_push_retry_max() -> u32 {
    3
}

fn default_push_timeout_secs() -> u64 {
    30
}

fn default_presign_ttl_secs() -> u64 {
    3600
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            retry_delays_secs: default_push_retry_delays(),
            retry_max: default_push_retry_max(),
            timeout_secs: default_push_timeout_secs(),
            presign_ttl_secs: default_presign_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SandboxConfig {
    #[serde(default = "default_sandbox_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_sandbox_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_sandbox_retry_cap_secs")]
    pub retry_delay_cap_secs: u64,
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
}

fn default_sandbox_timeout_secs() -> u64 {
    300
}

fn default_sandbox_max_retries() -> u32 {
    1
}

fn default_sandbox_retry_cap_secs() -> u64 {
    300
}

fn default_interpreter() -> String {
    "python3".to_string()
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_sandbox_timeout_secs(),
            max_retries: default_sandbox_max_retries(),
            retry_delay_cap_secs: default_sandbox_retry_cap_secs(),
            interpreter: default_interpreter(),
        }
    }
}

/// Process-wide connection settings for the ERP-session webhook target
/// (spec §4.6; Kingdee K3 Cloud). A `Webhook` of type `erp-session` has
/// no per-row endpoint, so this is the only place these live.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErpConfig {
    pub api_url: Option<String>,
    pub db_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_erp_save_mode")]
    pub save_mode: String,
    #[serde(default = "default_erp_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_erp_save_mode() -> String {
    "smart".to_string()
}

fn default_erp_timeout_secs() -> u64 {
    30
}

impl Default for ErpConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            db_id: None,
            username: None,
            password: None,
            save_mode: default_erp_save_mode(),
            timeout_secs: default_erp_timeout_secs(),
        }
    }
}

impl ErpConfig {
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.api_url.as_deref().is_some_and(|s| !s.is_empty())
            && self.db_id.as_deref().is_some_and(|s| !s.is_empty())
            && self.username.as_deref().is_some_and(|s| !s.is_empty())
            && self.password.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Top-level runtime configuration, as loaded from `docpipe.toml` and
/// overridden by environment variables (`DOCPIPE_*`).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub ocr: OcrConfig,
    pub llm: Option<LlmConfig>,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub erp: ErpConfig,
}

impl RuntimeConfig {
    /// Load layered configuration: built-in defaults, then `path` (if it
    /// exists) overlaid via TOML, then `DOCPIPE_*` environment overrides
    /// for the handful of settings operators need to flip without a
    /// config file (queue DSN, LLM endpoint/key).
    pub fn load(path: Option<&Path>) -> docpipe_utils::Result<Self> {
        let mut config = Self::default();
        if let Some(path) = path {
            if path.exists() {
                let raw = std::fs::read_to_string(path).map_err(docpipe_utils::DocpipeError::Io)?;
                config = toml::from_str(&raw)
                    .map_err(|e| docpipe_utils::DocpipeError::Config(e.to_string()))?;
            }
        }
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dsn) = std::env::var("DOCPIPE_QUEUE_DSN") {
            self.queue.dsn = dsn;
        }
        if let Ok(endpoint) = std::env::var("DOCPIPE_LLM_ENDPOINT") {
            if let Some(llm) = self.llm.as_mut() {
                llm.endpoint = endpoint;
            }
        }
    }

    /// Discover a `docpipe.toml` the way `xchecker-config`'s discovery
    /// module walks up from the current directory, falling back to a
    /// user-global config directory.
    #[must_use]
    pub fn discover_path() -> Option<PathBuf> {
        let mut dir = std::env::current_dir().ok()?;
        loop {
            let candidate = dir.join("docpipe.toml");
            if candidate.exists() {
                return Some(candidate);
            }
            if !dir.pop() {
                break;
            }
        }
        dirs::config_dir().map(|d| d.join("docpipe").join("config.toml"))
    }
}
