//! docpipe: an intelligent document processing pipeline.
//!
//! This crate is a thin umbrella over the workspace's independently
//! published sub-crates — each module here just re-exports one of
//! them, so downstream code can depend on `docpipe` alone and reach
//! every stage of the pipeline:
//!
//! - [`types`]: shared domain types (`Job`, `RuleVersion`, `SchemaNode`, `Webhook`, ...).
//! - [`utils`]: error type, exit codes, logging setup, process execution helpers.
//! - [`config`]: `RuntimeConfig` loading (TOML file + environment overrides).
//! - [`queue`]: the durable SQLite-backed queue fabric jobs move through.
//! - [`store`]: the job/audit-log/push-log/pipeline-execution store.
//! - [`ocr`]: OCR backends and page dispatch.
//! - [`extraction`]: the rule-driven field extraction engine.
//! - [`validation`]: field cleaning and validation predicates.
//! - [`gate`]: the audit gate that decides whether a job needs human review.
//! - [`llm`]: LLM backends for schema-guided field resolution, with circuit breaking.
//! - [`sandbox`]: the user-script execution sandbox.
//! - [`webhook`]: outbound webhook dispatch, signing, and retry policy.
//! - [`orchestrator`]: the stage workers that tie the above together.
//!
//! The `docpipe` command-line binary (crate `docpipe-cli`) is the
//! primary consumer of this crate; it is a separate workspace member
//! since it is a binary-only dependency surface, not a library others
//! would want to link against.

pub use docpipe_config as config;
pub use docpipe_extraction as extraction;
pub use docpipe_gate as gate;
pub use docpipe_llm as llm;
pub use docpipe_ocr as ocr;
pub use docpipe_orchestrator as orchestrator;
pub use docpipe_queue as queue;
pub use docpipe_sandbox as sandbox;
pub use docpipe_store as store;
pub use docpipe_types as types;
pub use docpipe_utils as utils;
pub use docpipe_validation as validation;
pub use docpipe_webhook as webhook;
