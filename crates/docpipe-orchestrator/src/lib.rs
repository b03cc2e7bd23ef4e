//! Stage-worker orchestration (spec §2, §4): the three durable-queue
//! consumers that carry a job from `queued` through OCR, the optional
//! user-script pipeline, and webhook delivery, plus the narrow
//! collaborator traits (`ObjectStore`, `PageRenderer`, `RuleRepository`,
//! `WebhookRepository`) those workers are built against instead of a
//! concrete database/object-storage integration.

pub mod credentials;
pub mod ocr_worker;
pub mod pipeline_worker;
pub mod push_worker;
pub mod rendering;
pub mod rules;
pub mod storage;

pub use ocr_worker::OcrWorker;
pub use pipeline_worker::PipelineWorker;
pub use push_worker::PushWorker;
pub use rendering::{IdentityPageRenderer, PageRenderer};
pub use rules::{InMemoryRuleRepository, InMemoryWebhookRepository, RuleRepository, WebhookRepository};
pub use storage::{LocalFsObjectStore, ObjectStat, ObjectStore};
