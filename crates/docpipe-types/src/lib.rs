//! Domain types shared across the docpipe workspace.
//!
//! This crate has no I/O of its own: it only defines the entities from
//! the data model (jobs, rules, webhooks, push logs), the recursive
//! schema-node tree, and a handful of pure helpers (field-path get/set,
//! rule-version label grammar, page-expression grammar) that several
//! other crates need without depending on the store or queue fabric.

pub mod field_path;
pub mod job;
pub mod page_expr;
pub mod pipeline;
pub mod rule;
pub mod schema;
pub mod version_label;
pub mod webhook;

pub use job::{AuditReason, AuditReasonType, AuditorRef, ConfidenceMap, Job, JobStatus, OcrPage, OcrStructured, OcrTextBox};
pub use pipeline::{Pipeline, PipelineExecution, PipelineExecutionStatus};
pub use rule::{ExtractionStrategyConfig, Rule, RuleVersion, RuleVersionStatus};
pub use schema::{SchemaNode, SchemaNodeKind};
pub use webhook::{AuthMode, PushLog, SaveMode, Webhook, WebhookType};

/// A 32-byte BLAKE3 content digest, used as the dedup key component.
pub type ContentHash = [u8; 32];

/// Compute the content hash of a document's raw bytes.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> ContentHash {
    *blake3::hash(bytes).as_bytes()
}

#[must_use]
pub fn content_hash_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}
