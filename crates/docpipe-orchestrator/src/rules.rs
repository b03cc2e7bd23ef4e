//! Rule, pipeline, and webhook-binding lookups. Relational persistence
//! for these entities is out of scope (spec §1: "REST endpoints for
//! CRUD on rules/users/tokens" and the broader schema-sketch-only
//! stance on persistence beyond the job store, §6); the orchestrator
//! consumes them through the same narrow-trait pattern as `storage`
//! and `docpipe_llm::LlmBackend`. `InMemoryRuleRepository` backs the
//! CLI smoke-test path and the worker tests.

use async_trait::async_trait;
use docpipe_types::pipeline::Pipeline;
use docpipe_types::rule::RuleVersion;
use docpipe_types::webhook::Webhook;
use docpipe_utils::{DocpipeError, Result};
use std::collections::HashMap;
use std::sync::RwLock;

#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn get_version(&self, rule_id: &str, version: &str) -> Result<RuleVersion>;
    async fn get_pipeline(&self, rule_id: &str) -> Result<Option<Pipeline>>;
}

#[async_trait]
pub trait WebhookRepository: Send + Sync {
    /// Every active webhook bound to `rule_id` (many-to-many, spec §3).
    async fn bound_webhooks(&self, rule_id: &str) -> Result<Vec<Webhook>>;
}

#[derive(Default)]
pub struct InMemoryRuleRepository {
    versions: RwLock<HashMap<(String, String), RuleVersion>>,
    pipelines: RwLock<HashMap<String, Pipeline>>,
}

impl InMemoryRuleRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_version(&self, version: RuleVersion) {
        let key = (version.rule_id.clone(), version.version.clone());
        self.versions.write().expect("lock not poisoned").insert(key, version);
    }

    pub fn insert_pipeline(&self, pipeline: Pipeline) {
        self.pipelines
            .write()
            .expect("lock not poisoned")
            .insert(pipeline.rule_id.clone(), pipeline);
    }
}

#[async_trait]
impl RuleRepository for InMemoryRuleRepository {
    async fn get_version(&self, rule_id: &str, version: &str) -> Result<RuleVersion> {
        self.versions
            .read()
            .expect("lock not poisoned")
            .get(&(rule_id.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| DocpipeError::Store(format!("rule version {rule_id}/{version} not found")))
    }

    async fn get_pipeline(&self, rule_id: &str) -> Result<Option<Pipeline>> {
        Ok(self.pipelines.read().expect("lock not poisoned").get(rule_id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryWebhookRepository {
    bindings: RwLock<HashMap<String, Vec<Webhook>>>,
}

impl InMemoryWebhookRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, rule_id: impl Into<String>, webhook: Webhook) {
        self.bindings
            .write()
            .expect("lock not poisoned")
            .entry(rule_id.into())
            .or_default()
            .push(webhook);
    }
}

#[async_trait]
impl WebhookRepository for InMemoryWebhookRepository {
    async fn bound_webhooks(&self, rule_id: &str) -> Result<Vec<Webhook>> {
        Ok(self
            .bindings
            .read()
            .expect("lock not poisoned")
            .get(rule_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|w| w.active)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpipe_types::rule::{ExtractionMap, PageStrategy, RuleVersionStatus, ValidationMap};
    use docpipe_types::schema::SchemaNode;
    use docpipe_types::webhook::{AuthMode, WebhookType};

    fn version() -> RuleVersion {
        RuleVersion {
            rule_id: "r1".into(),
            version: "V1.0".into(),
            status: RuleVersionStatus::Published,
            schema: SchemaNode::field("root"),
            extraction_map: ExtractionMap::new(),
            validation_map: ValidationMap::new(),
            page_strategy: PageStrategy::SinglePage,
            default_confidence_threshold: None,
            enhancement: None,
            consistency: None,
        }
    }

    #[tokio::test]
    async fn missing_version_is_an_error() {
        let repo = InMemoryRuleRepository::new();
        assert!(repo.get_version("r1", "V1.0").await.is_err());
    }

    #[tokio::test]
    async fn inserted_version_round_trips() {
        let repo = InMemoryRuleRepository::new();
        repo.insert_version(version());
        let fetched = repo.get_version("r1", "V1.0").await.unwrap();
        assert_eq!(fetched.rule_id, "r1");
    }

    #[tokio::test]
    async fn inactive_webhooks_are_excluded() {
        let repo = InMemoryWebhookRepository::new();
        repo.bind(
            "r1",
            Webhook {
                id: "wh1".into(),
                name: "inactive".into(),
                kind: WebhookType::Generic,
                endpoint_url: Some("https://example.test/hook".into()),
                auth_mode: AuthMode::None,
                auth_secret_encrypted: None,
                signing_secret: None,
                request_template: serde_json::json!({}),
                active: false,
                save_mode: None,
            },
        );
        assert!(repo.bound_webhooks("r1").await.unwrap().is_empty());
    }
}
