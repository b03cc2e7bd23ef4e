//! The `Job` entity and its state machine (spec §3, §4.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Status of a job, matching the transitions in spec §4.1.
///
/// Terminal states: `Completed` is *not* terminal on its own (it always
/// moves on to `Pushing`), the true terminals are `Rejected`, `Failed`,
/// `PushSuccess`, and `PushFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    PendingAudit,
    Completed,
    Rejected,
    Pushing,
    PushSuccess,
    PushFailed,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::PendingAudit => "pending_audit",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Pushing => "pushing",
            Self::PushSuccess => "push_success",
            Self::PushFailed => "push_failed",
            Self::Failed => "failed",
        }
    }

    /// Whether this status is a terminal outcome for the job (no further
    /// automatic transition occurs; retry/cancel is the only way out).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Rejected | Self::PushSuccess | Self::PushFailed | Self::Failed
        )
    }

    /// Whether `self -> next` is a permitted transition per spec §4.1,
    /// excluding the explicit operator retry/cancel actions (those are
    /// modeled separately in [`JobStatus::can_requeue_from`] and
    /// [`JobStatus::can_cancel_from`]).
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Processing)
                | (Self::Processing, Self::PendingAudit)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
                | (Self::PendingAudit, Self::Completed)
                | (Self::PendingAudit, Self::Rejected)
                | (Self::Completed, Self::Pushing)
                | (Self::Pushing, Self::PushSuccess)
                | (Self::Pushing, Self::PushFailed)
                | (Self::Pushing, Self::Failed)
        )
    }

    /// `failed` and `rejected` may be re-queued back to `queued`.
    #[must_use]
    pub const fn can_requeue_from(&self) -> bool {
        matches!(self, Self::Failed | Self::Rejected)
    }

    /// `push_failed` may be re-pushed (to `pushing`).
    #[must_use]
    pub const fn can_repush_from(&self) -> bool {
        matches!(self, Self::PushFailed)
    }

    /// `queued` may be cancelled (-> `rejected`, reason "cancelled").
    #[must_use]
    pub const fn can_cancel_from(&self) -> bool {
        matches!(self, Self::Queued)
    }
}

/// Reference to the rule version a job was extracted against. Immutable
/// after job creation (invariant: `(content_hash, rule_id, rule_version)`
/// is fixed for the life of the job).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRef {
    pub rule_id: String,
    pub rule_version: String,
}

/// A single OCR text box: recognized text, confidence in `[0, 1]`, and an
/// axis-aligned bounding box in pixels `(x, y, width, height)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrTextBox {
    pub text: String,
    pub confidence: f32,
    pub bbox: (u32, u32, u32, u32),
}

/// One OCR'd page: full text, per-box detail, average page confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrPage {
    pub page_number: u32,
    pub text: String,
    pub boxes: Vec<OcrTextBox>,
    pub average_confidence: f32,
}

/// The full OCR output for a job: one entry per page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrStructured {
    pub pages: Vec<OcrPage>,
}

impl OcrStructured {
    /// Merged full text: page texts joined by `separator` (default `\n`).
    #[must_use]
    pub fn merged_text(&self, separator: &str) -> String {
        self.pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(separator)
    }
}

/// Per-field confidence map, keyed by dotted field path.
pub type ConfidenceMap = HashMap<String, f32>;

/// Tag for why a job was routed to audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditReasonType {
    ValidationFailed,
    ConfidenceLow,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReason {
    #[serde(rename = "type")]
    pub kind: AuditReasonType,
    pub field: String,
    /// Present for `ConfidenceLow` reasons.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,
    /// Present for `ValidationFailed` reasons.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Identity of the human auditor who adjudicated a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditorRef {
    pub id: String,
    pub display_name: String,
}

/// LLM usage accounting for a single job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmAccounting {
    pub tokens: u64,
    pub cost_micros: u64,
}

/// The primary entity: one document run through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub original_filename: String,
    pub object_key: String,
    pub content_hash: [u8; 32],
    pub page_count: u32,
    pub rule: RuleRef,
    pub status: JobStatus,
    pub is_instant: bool,
    pub ocr_text: String,
    pub ocr_structured: OcrStructured,
    pub extracted_fields: serde_json::Value,
    pub confidence: ConfidenceMap,
    pub audit_reasons: Vec<AuditReason>,
    pub auditor: Option<AuditorRef>,
    pub audited_at: Option<DateTime<Utc>>,
    pub llm_accounting: LlmAccounting,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Job {
    /// Create a freshly queued job (not yet dequeued by any worker).
    #[must_use]
    pub fn new_queued(
        id: impl Into<String>,
        original_filename: impl Into<String>,
        object_key: impl Into<String>,
        content_hash: [u8; 32],
        page_count: u32,
        rule: RuleRef,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            original_filename: original_filename.into(),
            object_key: object_key.into(),
            content_hash,
            page_count,
            rule,
            status: JobStatus::Queued,
            is_instant: false,
            ocr_text: String::new(),
            ocr_structured: OcrStructured::default(),
            extracted_fields: serde_json::Value::Object(serde_json::Map::new()),
            confidence: ConfidenceMap::new(),
            audit_reasons: Vec::new(),
            auditor: None,
            audited_at: None,
            llm_accounting: LlmAccounting::default(),
            created_at,
            started_at: None,
            completed_at: None,
            last_error: None,
        }
    }

    /// Property 3 (§8): for every `pending_audit` job, `|audit_reasons| > 0`.
    #[must_use]
    pub fn invariant_pending_audit_has_reasons(&self) -> bool {
        self.status != JobStatus::PendingAudit || !self.audit_reasons.is_empty()
    }

    /// Build an instant dedup-clone job: a new `completed` job row that
    /// reuses `source`'s OCR output, extracted fields, confidence map,
    /// and audit reasons verbatim, with LLM accounting zeroed (the clone
    /// never called the LLM) and `is_instant` set so downstream stages
    /// and reporting can tell it apart from an organically-processed job
    /// (spec §4.2).
    #[must_use]
    pub fn new_instant_clone(
        id: impl Into<String>,
        original_filename: impl Into<String>,
        object_key: impl Into<String>,
        content_hash: [u8; 32],
        page_count: u32,
        rule: RuleRef,
        source: &Self,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            original_filename: original_filename.into(),
            object_key: object_key.into(),
            content_hash,
            page_count,
            rule,
            status: JobStatus::Completed,
            is_instant: true,
            ocr_text: source.ocr_text.clone(),
            ocr_structured: source.ocr_structured.clone(),
            extracted_fields: source.extracted_fields.clone(),
            confidence: source.confidence.clone(),
            audit_reasons: source.audit_reasons.clone(),
            auditor: None,
            audited_at: None,
            llm_accounting: LlmAccounting::default(),
            created_at,
            started_at: Some(created_at),
            completed_at: Some(created_at),
            last_error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_to_processing_allowed() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Processing));
    }

    #[test]
    fn processing_cannot_skip_to_pushing() {
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Pushing));
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::PushSuccess.is_terminal());
        assert!(JobStatus::PushFailed.is_terminal());
        assert!(JobStatus::Rejected.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Completed.is_terminal());
    }

    #[test]
    fn retry_and_cancel_semantics() {
        assert!(JobStatus::Failed.can_requeue_from());
        assert!(JobStatus::Rejected.can_requeue_from());
        assert!(!JobStatus::PushFailed.can_requeue_from());
        assert!(JobStatus::PushFailed.can_repush_from());
        assert!(JobStatus::Queued.can_cancel_from());
    }

    #[test]
    fn pending_audit_invariant() {
        let mut job = Job::new_queued(
            "j1",
            "f.pdf",
            "2026/01/01/j1/f.pdf",
            [0u8; 32],
            1,
            RuleRef { rule_id: "r1".into(), rule_version: "V1.0".into() },
            Utc::now(),
        );
        job.status = JobStatus::PendingAudit;
        assert!(!job.invariant_pending_audit_has_reasons());
        job.audit_reasons.push(AuditReason {
            kind: AuditReasonType::ConfidenceLow,
            field: "amount".into(),
            confidence: Some(72.0),
            threshold: Some(90.0),
            message: None,
        });
        assert!(job.invariant_pending_audit_has_reasons());
    }

    #[test]
    fn instant_clone_copies_extraction_and_zeroes_llm_accounting() {
        let mut source = Job::new_queued(
            "job-src",
            "invoice.pdf",
            "2026/01/01/job-src/invoice.pdf",
            [7u8; 32],
            1,
            RuleRef { rule_id: "r1".into(), rule_version: "V1.0".into() },
            Utc::now(),
        );
        source.status = JobStatus::Completed;
        source.extracted_fields = serde_json::json!({"invoice_number": "INV-001"});
        source.confidence.insert("invoice_number".into(), 95.0);
        source.llm_accounting = LlmAccounting { tokens: 512, cost_micros: 1200 };

        let clone = Job::new_instant_clone(
            "job-clone",
            source.original_filename.clone(),
            source.object_key.clone(),
            source.content_hash,
            source.page_count,
            RuleRef { rule_id: "r1".into(), rule_version: "V1.0".into() },
            &source,
            Utc::now(),
        );

        assert_eq!(clone.status, JobStatus::Completed);
        assert!(clone.is_instant);
        assert_eq!(clone.extracted_fields, source.extracted_fields);
        assert_eq!(clone.confidence, source.confidence);
        assert_eq!(clone.llm_accounting, LlmAccounting::default());
        assert_ne!(clone.id, source.id);
    }
}
