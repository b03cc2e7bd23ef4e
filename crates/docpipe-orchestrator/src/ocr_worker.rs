//! OCR-stage worker: the `ocr` queue consumer that runs OCR dispatch,
//! field extraction, the single consolidated LLM-schema call, cleaning,
//! validation, and the audit gate, then transitions the job to
//! `pending_audit` or `completed` (spec §4.1, §4.4). Ported in spirit
//! from `original_source/backend/app/tasks/ocr_worker.py`'s
//! dequeue-process-transition loop, generalized onto
//! `docpipe_store::JobStore::transition`'s CAS primitive instead of a
//! `SELECT ... FOR UPDATE` row lock (SPEC_FULL.md §4.1 addition).

use crate::rendering::PageRenderer;
use crate::rules::RuleRepository;
use crate::storage::ObjectStore;
use docpipe_extraction::{calculate_llm_confidence, consistency, run as run_extraction, EngineResult};
use docpipe_llm::{LlmBackend, LlmInvocation};
use docpipe_ocr::{select_pages, OcrBackend, PageImage};
use docpipe_queue::{QueueFabric, QueueName};
use docpipe_store::JobStore;
use docpipe_types::job::{AuditReason, AuditReasonType, JobStatus};
use docpipe_types::rule::{ConsistencyPolicy, ExtractionStrategyConfig, PageStrategy, RuleVersion};
use docpipe_types::schema::SchemaNodeKind;
use docpipe_utils::{DocpipeError, Result};
use docpipe_validation::{clean, validate};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Confidence assigned to a field resolved by the enhancement pass
/// (spec §4.4 "Enhance"): below the LLM-schema pass's own scoring since
/// enhancement only runs when a field was already judged low-confidence,
/// but high enough that a correct second-pass value does not immediately
/// re-trip the gate.
const ENHANCEMENT_CONFIDENCE: f32 = 75.0;

/// Confidence assigned when the consistency check's vision pass wins out
/// over the original extraction (`prefer_llm` policy).
const CONSISTENCY_LLM_CONFIDENCE: f32 = 85.0;

pub struct OcrWorker {
    queue: QueueFabric,
    store: JobStore,
    rules: Arc<dyn RuleRepository>,
    objects: Arc<dyn ObjectStore>,
    renderer: Arc<dyn PageRenderer>,
    ocr_primary: Arc<dyn OcrBackend>,
    ocr_fallback: Option<Arc<dyn OcrBackend>>,
    ocr_parallelism: usize,
    page_separator: String,
    llm: Option<Arc<dyn LlmBackend>>,
    llm_model: String,
    llm_timeout: Duration,
    llm_vision_model: Option<String>,
    owner: String,
    lease: Duration,
}

impl OcrWorker {
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: QueueFabric,
        store: JobStore,
        rules: Arc<dyn RuleRepository>,
        objects: Arc<dyn ObjectStore>,
        renderer: Arc<dyn PageRenderer>,
        ocr_primary: Arc<dyn OcrBackend>,
        ocr_fallback: Option<Arc<dyn OcrBackend>>,
        ocr_parallelism: usize,
        page_separator: String,
        llm: Option<Arc<dyn LlmBackend>>,
        llm_model: String,
        llm_timeout: Duration,
        llm_vision_model: Option<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            store,
            rules,
            objects,
            renderer,
            ocr_primary,
            ocr_fallback,
            ocr_parallelism,
            page_separator,
            llm,
            llm_model,
            llm_timeout,
            llm_vision_model,
            owner: owner.into(),
            lease: Duration::from_secs(600),
        }
    }

    /// Claim and process one `ocr` message. Returns `Ok(false)` if the
    /// queue was empty.
    pub async fn claim_and_process(&self) -> Result<bool> {
        let Some(message) = self.queue.consume(QueueName::Ocr, &self.owner, self.lease).await? else {
            return Ok(false);
        };
        let Some(job_id) = message.payload["job_id"].as_str().map(str::to_string) else {
            warn!(message_id = message.id, "ocr message missing job_id, dropping");
            self.queue.ack(message.id).await?;
            return Ok(true);
        };

        let job = match self.store.get(&job_id).await? {
            Some(job) => job,
            None => {
                warn!(job_id, "ocr message references unknown job, dropping");
                self.queue.ack(message.id).await?;
                return Ok(true);
            }
        };

        if job.status != JobStatus::Queued {
            // Redelivered duplicate for a job another worker already
            // moved past `queued`; drop without reprocessing (spec §4.3).
            self.queue.ack(message.id).await?;
            return Ok(true);
        }

        let transitioned = self
            .store
            .transition(&job_id, JobStatus::Queued, JobStatus::Processing, |job| {
                job.started_at = Some(chrono::Utc::now());
            })
            .await;
        let mut job = match transitioned {
            Ok(job) => job,
            Err(DocpipeError::StatusGuard { .. }) => {
                // Lost the race to another worker's claim on the same job.
                self.queue.ack(message.id).await?;
                return Ok(true);
            }
            Err(e) => {
                // Transient store failure: leave the message for redelivery.
                self.queue.nack(message.id, Duration::from_secs(5)).await?;
                return Err(e);
            }
        };
        info!(job_id = %job.id, from = "queued", to = "processing", "ocr worker claimed job");

        match self.process(&mut job).await {
            Ok(()) => {
                self.queue.ack(message.id).await?;
                Ok(true)
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "ocr stage failed, marking job failed");
                self.store
                    .transition(&job.id, JobStatus::Processing, JobStatus::Failed, |job| {
                        job.last_error = Some(e.to_string());
                    })
                    .await?;
                self.queue.ack(message.id).await?;
                Ok(true)
            }
        }
    }

    async fn process(&self, job: &mut docpipe_types::job::Job) -> Result<()> {
        let rule_version = self.rules.get_version(&job.rule.rule_id, &job.rule.rule_version).await?;

        let bytes = self.objects.get(&job.object_key).await?;
        let mime_type = mime_for(&job.original_filename);
        let all_pages = self.renderer.render_pages(&bytes, mime_type, job.page_count).await?;
        let pages = select_for_strategy(&rule_version.page_strategy, all_pages, job.page_count);

        let ocr_structured = docpipe_ocr::recognize_pages(
            pages,
            self.ocr_primary.clone(),
            self.ocr_fallback.clone(),
            self.ocr_parallelism,
        )
        .await?;
        let ocr_text = ocr_structured.merged_text(&self.page_separator);

        let EngineResult { mut fields, mut confidence, pending_llm_fields } =
            run_extraction(&ocr_structured, &rule_version.extraction_map, &rule_version.schema)?;

        if !pending_llm_fields.is_empty() {
            self.resolve_llm_fields(&rule_version, &ocr_structured, &ocr_text, &pending_llm_fields, &mut fields, &mut confidence, job)
                .await;
        }

        if let Some(enhancement) = rule_version.enhancement.as_ref().filter(|e| e.enabled) {
            self.enhance_low_confidence_fields(&rule_version, enhancement, &ocr_text, &mut fields, &mut confidence, job)
                .await;
        }

        let mut consistency_reasons = Vec::new();
        if let Some(consistency_cfg) = rule_version.consistency.as_ref().filter(|c| c.enabled) {
            consistency_reasons = self
                .check_consistency(&rule_version, consistency_cfg, &ocr_text, &mut fields, &mut confidence, job)
                .await;
        }

        clean(&mut fields, &rule_version.validation_map);
        let mut validation_reasons = validate(&fields, &rule_version.validation_map);
        validation_reasons.extend(consistency_reasons);
        let gate_result = docpipe_gate::evaluate(
            &rule_version.schema,
            &confidence,
            rule_version.default_confidence_threshold,
            validation_reasons,
        );

        job.ocr_text = ocr_text;
        job.ocr_structured = ocr_structured;
        job.extracted_fields = fields;
        job.confidence = confidence;
        job.audit_reasons = gate_result.reasons;

        if gate_result.needs_audit {
            self.store
                .transition(&job.id, JobStatus::Processing, JobStatus::PendingAudit, |stored| {
                    copy_extraction(job, stored);
                })
                .await?;
            info!(job_id = %job.id, to = "pending_audit", "routed to audit");
        } else {
            let completed = self
                .store
                .transition(&job.id, JobStatus::Processing, JobStatus::Completed, |stored| {
                    copy_extraction(job, stored);
                    stored.completed_at = Some(chrono::Utc::now());
                })
                .await?;
            self.store.record_dedup_source(&completed).await?;
            self.queue
                .publish(QueueName::Pipeline, &serde_json::json!({"job_id": job.id}), Duration::ZERO)
                .await?;
            info!(job_id = %job.id, to = "completed", "gate passed, enqueued for pipeline stage");
        }
        Ok(())
    }

    async fn resolve_llm_fields(
        &self,
        rule_version: &RuleVersion,
        ocr: &docpipe_types::OcrStructured,
        ocr_text: &str,
        pending_fields: &[String],
        fields: &mut serde_json::Value,
        confidence: &mut docpipe_types::job::ConfidenceMap,
        job: &mut docpipe_types::job::Job,
    ) {
        let Some(llm) = &self.llm else {
            warn!(job_id = %job.id, "rule has LLM-schema fields but no LLM backend is configured, skipping");
            return;
        };

        let hints = build_hints(rule_version, pending_fields);
        let schema = build_llm_schema(rule_version, pending_fields);
        let invocation = LlmInvocation {
            model: self.llm_model.clone(),
            timeout: self.llm_timeout,
            instructions: "Find each requested field in the document. Use an empty string when \
                a field is absent, return arrays for array fields, and preserve the original \
                wording verbatim."
                .to_string(),
            data: ocr_text.to_string(),
            hints: Some(hints),
            schema,
        };

        match llm.invoke(invocation).await {
            Ok(result) => {
                for path in pending_fields {
                    let value = result.fields.get(path).cloned().unwrap_or(serde_json::Value::Null);
                    let kind = rule_version
                        .schema
                        .resolve(path)
                        .map_or(SchemaNodeKind::Field, |n| n.kind);
                    let score = calculate_llm_confidence(ocr, &value, kind);
                    docpipe_types::field_path::set(fields, path, value);
                    confidence.insert(path.clone(), score);
                }
                job.llm_accounting.tokens += result.tokens_input.unwrap_or(0) + result.tokens_output.unwrap_or(0);
            }
            Err(e) => {
                // Circuit breaker open or endpoint failure: degrade to
                // OCR-only for these fields (spec §4.6 "Circuit breaker").
                warn!(job_id = %job.id, error = %e, "LLM-schema extraction failed, leaving fields unresolved");
            }
        }
    }

    /// Enhancement stage (spec §4.4 "Enhance"): fields below
    /// `enhancement.threshold` get a second, independent LLM pass over
    /// the same OCR text. A field the second pass resolves overwrites
    /// the first pass's value at a flat [`ENHANCEMENT_CONFIDENCE`] (the
    /// point of a second pass is to give a low-confidence field another
    /// chance, not to out-score a field that was already trusted).
    async fn enhance_low_confidence_fields(
        &self,
        rule_version: &RuleVersion,
        enhancement: &docpipe_types::rule::EnhancementConfig,
        ocr_text: &str,
        fields: &mut serde_json::Value,
        confidence: &mut docpipe_types::job::ConfidenceMap,
        job: &mut docpipe_types::job::Job,
    ) {
        let low_confidence: Vec<String> = confidence
            .iter()
            .filter(|(_, &score)| score < enhancement.threshold)
            .map(|(path, _)| path.clone())
            .collect();
        if low_confidence.is_empty() {
            return;
        }

        let Some(llm) = &self.llm else {
            warn!(job_id = %job.id, "rule has enhancement enabled but no LLM backend is configured, skipping");
            return;
        };

        let hints = build_hints(rule_version, &low_confidence);
        let schema = build_llm_schema(rule_version, &low_confidence);
        let invocation = LlmInvocation {
            model: self.llm_model.clone(),
            timeout: self.llm_timeout,
            instructions: "Re-examine the document for these low-confidence fields only. Use an \
                empty string when a field is genuinely absent; otherwise return your best reading."
                .to_string(),
            data: ocr_text.to_string(),
            hints: Some(hints),
            schema,
        };

        match llm.invoke(invocation).await {
            Ok(result) => {
                for path in &low_confidence {
                    let value = result.fields.get(path).cloned().unwrap_or(serde_json::Value::Null);
                    if value.is_null() || matches!(&value, serde_json::Value::String(s) if s.is_empty()) {
                        continue;
                    }
                    docpipe_types::field_path::set(fields, path, value);
                    confidence.insert(path.clone(), ENHANCEMENT_CONFIDENCE);
                }
                job.llm_accounting.tokens += result.tokens_input.unwrap_or(0) + result.tokens_output.unwrap_or(0);
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "enhancement pass failed, leaving fields at their prior confidence");
            }
        }
    }

    /// Consistency-check stage (spec §4.4 "Consistency-check"): every
    /// already-extracted field is independently re-derived by the vision
    /// model and compared against the existing value with
    /// [`consistency::similarity`]. A field whose similarity falls below
    /// `consistency.threshold` is resolved per `consistency.policy`;
    /// `manual_review` returns an [`AuditReason`] for the caller to fold
    /// into the validation reasons passed to the audit gate (appending
    /// directly to `job.audit_reasons` would be silently discarded, since
    /// `process` overwrites it with the gate's own result).
    async fn check_consistency(
        &self,
        rule_version: &RuleVersion,
        consistency_cfg: &docpipe_types::rule::ConsistencyConfig,
        ocr_text: &str,
        fields: &mut serde_json::Value,
        confidence: &mut docpipe_types::job::ConfidenceMap,
        job: &mut docpipe_types::job::Job,
    ) -> Vec<AuditReason> {
        let mut reasons = Vec::new();

        let Some(llm) = &self.llm else {
            warn!(job_id = %job.id, "rule has consistency-check enabled but no LLM backend is configured, skipping");
            return reasons;
        };
        let Some(vision_model) = &self.llm_vision_model else {
            warn!(job_id = %job.id, "rule has consistency-check enabled but no vision model is configured, skipping");
            return reasons;
        };

        let all_paths: Vec<String> = confidence.keys().cloned().collect();
        if all_paths.is_empty() {
            return reasons;
        }

        let hints = build_hints(rule_version, &all_paths);
        let schema = build_llm_schema(rule_version, &all_paths);
        let invocation = LlmInvocation {
            model: vision_model.clone(),
            timeout: self.llm_timeout,
            instructions: "Independently read every requested field from the document and report \
                your own reading, without reference to any prior extraction."
                .to_string(),
            data: ocr_text.to_string(),
            hints: Some(hints),
            schema,
        };

        let result = match llm.invoke(invocation).await {
            Ok(result) => result,
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "consistency-check vision pass failed, leaving fields unreconciled");
                return reasons;
            }
        };
        job.llm_accounting.tokens += result.tokens_input.unwrap_or(0) + result.tokens_output.unwrap_or(0);

        for path in &all_paths {
            let llm_value = result.fields.get(path).cloned().unwrap_or(serde_json::Value::Null);
            let ocr_value = docpipe_types::field_path::get(fields, path).cloned().unwrap_or(serde_json::Value::Null);
            let score = consistency::similarity(&ocr_value, &llm_value);
            if score >= consistency_cfg.threshold {
                continue;
            }

            match consistency_cfg.policy {
                ConsistencyPolicy::PreferLlm => {
                    docpipe_types::field_path::set(fields, path, llm_value);
                    confidence.insert(path.clone(), CONSISTENCY_LLM_CONFIDENCE);
                }
                ConsistencyPolicy::PreferOcr => {}
                ConsistencyPolicy::ManualReview => {
                    reasons.push(AuditReason {
                        kind: AuditReasonType::ValidationFailed,
                        field: path.clone(),
                        confidence: None,
                        threshold: None,
                        message: Some(format!(
                            "OCR/vision consistency mismatch (similarity {score:.1} below threshold {:.1})",
                            consistency_cfg.threshold
                        )),
                    });
                }
            }
        }

        reasons
    }
}

fn copy_extraction(from: &docpipe_types::job::Job, to: &mut docpipe_types::job::Job) {
    to.ocr_text = from.ocr_text.clone();
    to.ocr_structured = from.ocr_structured.clone();
    to.extracted_fields = from.extracted_fields.clone();
    to.confidence = from.confidence.clone();
    to.audit_reasons = from.audit_reasons.clone();
    to.llm_accounting = from.llm_accounting;
}

fn select_for_strategy(strategy: &PageStrategy, pages: Vec<PageImage>, page_count: u32) -> Vec<PageImage> {
    match strategy {
        PageStrategy::SinglePage => select_pages(Some("1"), pages, page_count),
        PageStrategy::MultiPage => select_pages(None, pages, page_count),
        PageStrategy::SpecifiedPages { expression } => select_pages(Some(expression), pages, page_count),
    }
}

fn mime_for(filename: &str) -> &'static str {
    let lower = filename.to_lowercase();
    if lower.ends_with(".pdf") {
        "application/pdf"
    } else if lower.ends_with(".png") {
        "image/png"
    } else {
        "image/jpeg"
    }
}

fn build_hints(rule_version: &RuleVersion, pending_fields: &[String]) -> String {
    let mut out = String::new();
    for path in pending_fields {
        if let Some(ExtractionStrategyConfig::LlmSchema { hint: Some(hint) }) =
            rule_version.extraction_map.get(path)
        {
            out.push_str(path);
            out.push_str(": ");
            out.push_str(hint);
            out.push('\n');
        }
    }
    out
}

/// A simplified JSON-Schema `properties` map covering the pending
/// fields, keyed by their full dotted path (the extraction engine and
/// `field_path::set` both operate on flat dotted keys, so the LLM
/// response is expected in the same shape rather than nested per the
/// rule's object/array tree).
fn build_llm_schema(rule_version: &RuleVersion, pending_fields: &[String]) -> serde_json::Value {
    let mut properties = serde_json::Map::new();
    for path in pending_fields {
        let node_type = rule_version.schema.resolve(path).map(|n| n.kind);
        let schema_type = match node_type {
            Some(SchemaNodeKind::Array) | Some(SchemaNodeKind::Table) => {
                serde_json::json!({"type": "array", "items": {"type": "string"}})
            }
            _ => serde_json::json!({"type": "string"}),
        };
        properties.insert(path.clone(), schema_type);
    }
    serde_json::json!({"type": "object", "properties": properties})
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::IdentityPageRenderer;
    use crate::rules::InMemoryRuleRepository;
    use crate::storage::LocalFsObjectStore;
    use async_trait::async_trait;
    use docpipe_types::job::{Job, OcrPage, OcrTextBox, RuleRef};
    use docpipe_types::rule::{ExtractionMap, RuleVersionStatus, ValidationMap};
    use docpipe_types::schema::SchemaNode;
    use std::collections::BTreeMap;

    struct FixedOcrBackend;
    #[async_trait]
    impl OcrBackend for FixedOcrBackend {
        async fn recognize(&self, page: &PageImage) -> Result<docpipe_types::job::OcrPage> {
            Ok(OcrPage {
                page_number: page.page_number,
                text: "Invoice INV-001 Total 1234".to_string(),
                boxes: vec![OcrTextBox {
                    text: "INV-001".to_string(),
                    confidence: 0.8,
                    bbox: (0, 0, 10, 10),
                }],
                average_confidence: 0.8,
            })
        }
        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn rule_version() -> RuleVersion {
        let mut extraction_map = ExtractionMap::new();
        extraction_map.insert(
            "invoice_number".to_string(),
            ExtractionStrategyConfig::Regex {
                pattern: r"INV-\d+".to_string(),
                match_all: false,
                capture_group: 0,
            },
        );
        let mut children = BTreeMap::new();
        children.insert("invoice_number".to_string(), SchemaNode::field("invoice_number").required());
        RuleVersion {
            rule_id: "rule-1".into(),
            version: "V1.0".into(),
            status: RuleVersionStatus::Published,
            schema: SchemaNode::object("root", children),
            extraction_map,
            validation_map: ValidationMap::new(),
            page_strategy: PageStrategy::SinglePage,
            default_confidence_threshold: None,
            enhancement: None,
            consistency: None,
        }
    }

    async fn worker() -> (OcrWorker, JobStore, QueueFabric, Arc<InMemoryRuleRepository>) {
        let store = JobStore::connect("sqlite::memory:").await.unwrap();
        let queue = QueueFabric::connect("sqlite::memory:").await.unwrap();
        let rules = Arc::new(InMemoryRuleRepository::new());
        rules.insert_version(rule_version());
        let dir = tempfile::tempdir().unwrap();
        let objects: Arc<dyn ObjectStore> = Arc::new(LocalFsObjectStore::new(dir.path()));
        objects.put("k1", b"%PDF-1.4").await.unwrap();
        let worker = OcrWorker::new(
            queue.clone(),
            store.clone(),
            rules.clone(),
            objects,
            Arc::new(IdentityPageRenderer),
            Arc::new(FixedOcrBackend),
            None,
            2,
            "\n".to_string(),
            None,
            "gpt-4o-mini".to_string(),
            Duration::from_secs(30),
            None,
            "ocr-worker-1",
        );
        (worker, store, queue, rules)
    }

    #[tokio::test]
    async fn regex_only_job_completes_and_enqueues_pipeline_message() {
        let (worker, store, queue, _rules) = worker().await;
        let job = Job::new_queued(
            "job-1",
            "invoice.pdf",
            "k1",
            [0u8; 32],
            1,
            RuleRef { rule_id: "rule-1".into(), rule_version: "V1.0".into() },
            chrono::Utc::now(),
        );
        store.insert_queued(&job).await.unwrap();
        queue
            .publish(QueueName::Ocr, &serde_json::json!({"job_id": "job-1"}), Duration::ZERO)
            .await
            .unwrap();

        assert!(worker.claim_and_process().await.unwrap());

        let updated = store.get("job-1").await.unwrap().unwrap();
        assert_eq!(updated.status, JobStatus::Completed);
        assert_eq!(updated.extracted_fields["invoice_number"], serde_json::json!("INV-001"));
        assert_eq!(queue.depth(QueueName::Pipeline).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_queue_returns_false() {
        let (worker, _store, _queue, _rules) = worker().await;
        assert!(!worker.claim_and_process().await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_delivery_for_already_processing_job_is_dropped() {
        let (worker, store, queue, _rules) = worker().await;
        let mut job = Job::new_queued(
            "job-2",
            "invoice.pdf",
            "k1",
            [0u8; 32],
            1,
            RuleRef { rule_id: "rule-1".into(), rule_version: "V1.0".into() },
            chrono::Utc::now(),
        );
        job.status = JobStatus::Completed;
        store.insert_queued(&job).await.unwrap(); // status column mismatches on purpose; job row itself carries Completed
        queue
            .publish(QueueName::Ocr, &serde_json::json!({"job_id": "job-2"}), Duration::ZERO)
            .await
            .unwrap();
        assert!(worker.claim_and_process().await.unwrap());
        assert_eq!(queue.depth(QueueName::Ocr).await.unwrap(), 0);
    }

    struct FakeLlmBackend {
        fields: serde_json::Value,
    }

    #[async_trait]
    impl LlmBackend for FakeLlmBackend {
        async fn invoke(&self, _inv: LlmInvocation) -> Result<docpipe_llm::LlmResult> {
            Ok(docpipe_llm::LlmResult {
                raw_response: "{}".to_string(),
                fields: self.fields.clone(),
                model_used: "fake".to_string(),
                tokens_input: Some(10),
                tokens_output: Some(5),
            })
        }
    }

    fn rule_version_with_enhancement() -> RuleVersion {
        let mut rv = rule_version();
        rv.enhancement = Some(docpipe_types::rule::EnhancementConfig { enabled: true, threshold: 90.0 });
        rv
    }

    fn rule_version_with_consistency(policy: ConsistencyPolicy) -> RuleVersion {
        let mut rv = rule_version();
        rv.consistency = Some(docpipe_types::rule::ConsistencyConfig { enabled: true, threshold: 90.0, policy });
        rv
    }

    async fn worker_with(
        rule_version: RuleVersion,
        llm: Option<Arc<dyn LlmBackend>>,
        llm_vision_model: Option<String>,
    ) -> (OcrWorker, JobStore, QueueFabric) {
        let store = JobStore::connect("sqlite::memory:").await.unwrap();
        let queue = QueueFabric::connect("sqlite::memory:").await.unwrap();
        let rules = Arc::new(InMemoryRuleRepository::new());
        rules.insert_version(rule_version);
        let dir = tempfile::tempdir().unwrap();
        let objects: Arc<dyn ObjectStore> = Arc::new(LocalFsObjectStore::new(dir.path()));
        objects.put("k1", b"%PDF-1.4").await.unwrap();
        let worker = OcrWorker::new(
            queue.clone(),
            store.clone(),
            rules,
            objects,
            Arc::new(IdentityPageRenderer),
            Arc::new(FixedOcrBackend),
            None,
            2,
            "\n".to_string(),
            llm,
            "gpt-4o-mini".to_string(),
            Duration::from_secs(30),
            llm_vision_model,
            "ocr-worker-1",
        );
        (worker, store, queue)
    }

    #[tokio::test]
    async fn enhancement_pass_overwrites_low_confidence_field() {
        // FixedOcrBackend's exact-match box confidence (88.0, see
        // its definition above) sits below this threshold on purpose.
        let llm: Arc<dyn LlmBackend> = Arc::new(FakeLlmBackend {
            fields: serde_json::json!({"invoice_number": "INV-RECHECKED"}),
        });
        let (worker, store, queue) = worker_with(rule_version_with_enhancement(), Some(llm), None).await;
        let job = Job::new_queued(
            "job-enh",
            "invoice.pdf",
            "k1",
            [0u8; 32],
            1,
            RuleRef { rule_id: "rule-1".into(), rule_version: "V1.0".into() },
            chrono::Utc::now(),
        );
        store.insert_queued(&job).await.unwrap();
        queue
            .publish(QueueName::Ocr, &serde_json::json!({"job_id": "job-enh"}), Duration::ZERO)
            .await
            .unwrap();

        assert!(worker.claim_and_process().await.unwrap());

        let updated = store.get("job-enh").await.unwrap().unwrap();
        assert_eq!(updated.extracted_fields["invoice_number"], serde_json::json!("INV-RECHECKED"));
        assert_eq!(updated.confidence["invoice_number"], ENHANCEMENT_CONFIDENCE);
        assert!(updated.llm_accounting.tokens > 0);
    }

    #[tokio::test]
    async fn consistency_check_prefer_llm_overwrites_mismatched_field() {
        let llm: Arc<dyn LlmBackend> = Arc::new(FakeLlmBackend {
            fields: serde_json::json!({"invoice_number": "INV-999"}),
        });
        let (worker, store, queue) =
            worker_with(rule_version_with_consistency(ConsistencyPolicy::PreferLlm), Some(llm), Some("vision-model".to_string())).await;
        let job = Job::new_queued(
            "job-cons-llm",
            "invoice.pdf",
            "k1",
            [0u8; 32],
            1,
            RuleRef { rule_id: "rule-1".into(), rule_version: "V1.0".into() },
            chrono::Utc::now(),
        );
        store.insert_queued(&job).await.unwrap();
        queue
            .publish(QueueName::Ocr, &serde_json::json!({"job_id": "job-cons-llm"}), Duration::ZERO)
            .await
            .unwrap();

        assert!(worker.claim_and_process().await.unwrap());

        let updated = store.get("job-cons-llm").await.unwrap().unwrap();
        assert_eq!(updated.extracted_fields["invoice_number"], serde_json::json!("INV-999"));
        assert_eq!(updated.confidence["invoice_number"], CONSISTENCY_LLM_CONFIDENCE);
    }

    #[tokio::test]
    async fn consistency_check_manual_review_routes_to_audit() {
        let llm: Arc<dyn LlmBackend> = Arc::new(FakeLlmBackend {
            fields: serde_json::json!({"invoice_number": "INV-999"}),
        });
        let (worker, store, queue) = worker_with(
            rule_version_with_consistency(ConsistencyPolicy::ManualReview),
            Some(llm),
            Some("vision-model".to_string()),
        )
        .await;
        let job = Job::new_queued(
            "job-cons-mr",
            "invoice.pdf",
            "k1",
            [0u8; 32],
            1,
            RuleRef { rule_id: "rule-1".into(), rule_version: "V1.0".into() },
            chrono::Utc::now(),
        );
        store.insert_queued(&job).await.unwrap();
        queue
            .publish(QueueName::Ocr, &serde_json::json!({"job_id": "job-cons-mr"}), Duration::ZERO)
            .await
            .unwrap();

        assert!(worker.claim_and_process().await.unwrap());

        let updated = store.get("job-cons-mr").await.unwrap().unwrap();
        assert_eq!(updated.status, JobStatus::PendingAudit);
        assert!(updated.audit_reasons.iter().any(|r| r.field == "invoice_number"));
        // original OCR value untouched by a manual-review verdict.
        assert_eq!(updated.extracted_fields["invoice_number"], serde_json::json!("INV-001"));
    }
}
