//! OCR backend abstraction: a trait with three implementations (local,
//! CLI, HTTP), page selection via the page-expression grammar, and
//! bounded-parallelism dispatch with fallback-on-empty.

mod backend;
mod cli;
mod dispatch;
mod http;
mod local;

pub use backend::{OcrBackend, PageImage};
pub use cli::CliOcrBackend;
pub use dispatch::{recognize_pages, select_pages};
pub use http::HttpOcrBackend;
pub use local::{InferenceEngine, LocalCnnBackend, NullEngine};
