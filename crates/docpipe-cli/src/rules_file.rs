//! Loads the rule versions, bound pipelines, and bound webhooks the
//! worker commands need into the in-memory repositories
//! `docpipe-orchestrator` defines. Relational CRUD for these entities is
//! out of scope (spec §1), so the CLI's only entry point for them is a
//! flat JSON file (`--rules-file`), the same "hand the process a
//! snapshot" shortcut the teacher's CLI uses for config discovery.

use docpipe_orchestrator::{InMemoryRuleRepository, InMemoryWebhookRepository, RuleRepository, WebhookRepository};
use docpipe_types::pipeline::Pipeline;
use docpipe_types::rule::RuleVersion;
use docpipe_types::webhook::Webhook;
use docpipe_utils::{DocpipeError, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

#[derive(Deserialize, Default)]
struct RulesFile {
    #[serde(default)]
    rule_versions: Vec<RuleVersion>,
    #[serde(default)]
    pipelines: Vec<Pipeline>,
    #[serde(default)]
    webhook_bindings: Vec<WebhookBinding>,
}

#[derive(Deserialize)]
struct WebhookBinding {
    rule_id: String,
    webhook: Webhook,
}

/// Load `path` (if given) into a fresh pair of in-memory repositories.
/// A missing path yields empty repositories rather than an error, so
/// `docpipe worker ocr` still runs (and simply finds no matching rule
/// for any job, which surfaces as a normal per-job failure) without one.
pub fn load(path: Option<&Path>) -> Result<(Arc<InMemoryRuleRepository>, Arc<InMemoryWebhookRepository>)> {
    let parsed = match path {
        Some(path) if path.exists() => {
            let raw = std::fs::read_to_string(path).map_err(DocpipeError::Io)?;
            serde_json::from_str::<RulesFile>(&raw)
                .map_err(|e| DocpipeError::Config(format!("invalid rules file {}: {e}", path.display())))?
        }
        _ => RulesFile::default(),
    };

    let rules = Arc::new(InMemoryRuleRepository::new());
    for version in parsed.rule_versions {
        rules.insert_version(version);
    }
    for pipeline in parsed.pipelines {
        rules.insert_pipeline(pipeline);
    }

    let webhooks = Arc::new(InMemoryWebhookRepository::new());
    for binding in parsed.webhook_bindings {
        webhooks.bind(binding.rule_id, binding.webhook);
    }

    Ok((rules, webhooks))
}
