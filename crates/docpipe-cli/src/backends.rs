//! Builds the concrete OCR and LLM backends a worker command runs
//! against from `RuntimeConfig`, mirroring the backend-selection `match`
//! the teacher's LLM provider wiring uses (one concrete type per
//! configured kind, boxed behind the shared trait).

use docpipe_config::{OcrBackendKind, OcrConfig, RuntimeConfig};
use docpipe_llm::{CircuitBreakingBackend, HttpChatBackend, LlmBackend};
use docpipe_ocr::{CliOcrBackend, HttpOcrBackend, LocalCnnBackend, NullEngine, OcrBackend};
use docpipe_utils::{DocpipeError, Result};
use std::sync::Arc;
use std::time::Duration;

#[must_use]
pub fn build_ocr_backend(kind: OcrBackendKind, config: &OcrConfig) -> Arc<dyn OcrBackend> {
    match kind {
        OcrBackendKind::LocalCnn => Arc::new(LocalCnnBackend::new(Box::new(NullEngine))),
        OcrBackendKind::Cli => {
            let executable = config.cli_path.clone().unwrap_or_else(|| "ocr-cli".into());
            Arc::new(CliOcrBackend::new(executable, Duration::from_secs(60)))
        }
        OcrBackendKind::Http => {
            let endpoint = config.http_endpoint.clone().unwrap_or_default();
            Arc::new(HttpOcrBackend::new(endpoint, Duration::from_secs(60)))
        }
    }
}

/// Whether the configured primary backend requires serialized access
/// (spec §5: the local CNN-style engine is not thread-safe). Used to
/// cap OCR dispatch parallelism at 1 regardless of the configured
/// value when this is the primary backend.
#[must_use]
pub fn requires_serial_access(kind: OcrBackendKind) -> bool {
    matches!(kind, OcrBackendKind::LocalCnn)
}

pub fn build_llm_backend(config: &RuntimeConfig) -> Result<Option<Arc<dyn LlmBackend>>> {
    let Some(llm) = &config.llm else {
        return Ok(None);
    };
    let api_key = std::env::var(&llm.api_key_env)
        .map_err(|_| DocpipeError::Config(format!("environment variable {} is not set", llm.api_key_env)))?;
    let http_backend = HttpChatBackend::new(llm.endpoint.clone(), api_key);
    let breaker = CircuitBreakingBackend::with_thresholds(
        Box::new(http_backend),
        llm.breaker_failure_threshold,
        Duration::from_secs(llm.breaker_half_open_secs),
    );
    Ok(Some(Arc::new(breaker)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpipe_config::RuntimeConfig;
    use serial_test::serial;

    #[test]
    fn local_cnn_requires_serial_access() {
        assert!(requires_serial_access(OcrBackendKind::LocalCnn));
        assert!(!requires_serial_access(OcrBackendKind::Cli));
        assert!(!requires_serial_access(OcrBackendKind::Http));
    }

    #[test]
    fn no_llm_config_yields_none() {
        let config = RuntimeConfig::default();
        assert!(build_llm_backend(&config).unwrap().is_none());
    }

    #[test]
    #[serial]
    fn missing_api_key_env_is_a_config_error() {
        let mut config = RuntimeConfig::default();
        config.llm = Some(docpipe_config::LlmConfig {
            endpoint: "http://localhost:9999".to_string(),
            api_key_env: "DOCPIPE_TEST_MISSING_LLM_KEY".to_string(),
            model: "gpt-test".to_string(),
            vision_model: None,
            timeout_secs: 60,
            breaker_failure_threshold: 5,
            breaker_half_open_secs: 300,
        });
        std::env::remove_var("DOCPIPE_TEST_MISSING_LLM_KEY");
        assert!(build_llm_backend(&config).is_err());
    }
}
