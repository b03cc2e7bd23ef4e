use thiserror::Error;

/// Exit codes used by the `docpipe` CLI to signal outcome classes to
/// whatever invokes it (CI, operator scripts). Library code never calls
/// `std::process::exit`; only the CLI maps errors to these via
/// [`DocpipeError::to_exit_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    pub const OK: Self = Self(0);
    pub const CONFIG: Self = Self(2);
    pub const QUEUE: Self = Self(3);
    pub const STORE: Self = Self(4);
    pub const EXTRACTION: Self = Self(5);
    pub const SANDBOX: Self = Self(6);
    pub const WEBHOOK: Self = Self(7);
    pub const LLM: Self = Self(8);
    pub const OTHER: Self = Self(1);

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }
}

/// Top-level error type returned by every `docpipe-*` library crate.
///
/// Mirrors the teacher's aggregated error enum: one `#[from]` variant per
/// subsystem, plus a handful of cross-cutting variants that don't belong
/// to any single subsystem.
#[derive(Error, Debug)]
pub enum DocpipeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("queue fabric error: {0}")]
    Queue(String),

    #[error("job store error: {0}")]
    Store(String),

    #[error("OCR backend error: {0}")]
    Ocr(String),

    #[error("extraction error: {0}")]
    Extraction(String),

    #[error("validation error for field {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("LLM backend error: {0}")]
    Llm(String),

    #[error("script sandbox error: {0}")]
    Sandbox(String),

    #[error("webhook dispatch error: {0}")]
    Webhook(String),

    #[error("job {job_id} is in status {actual}, expected {expected}")]
    StatusGuard {
        job_id: String,
        expected: String,
        actual: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DocpipeError {
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) => ExitCode::CONFIG,
            Self::Queue(_) => ExitCode::QUEUE,
            Self::Store(_) | Self::StatusGuard { .. } => ExitCode::STORE,
            Self::Ocr(_) | Self::Extraction(_) | Self::Validation { .. } => ExitCode::EXTRACTION,
            Self::Sandbox(_) => ExitCode::SANDBOX,
            Self::Webhook(_) => ExitCode::WEBHOOK,
            Self::Llm(_) => ExitCode::LLM,
            Self::Io(_) => ExitCode::OTHER,
        }
    }

    /// Whether this error class is transient infrastructure (§7) and
    /// therefore should be retried at the queue layer rather than
    /// written to `last_error` as a terminal failure.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Queue(_) | Self::Llm(_) | Self::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, DocpipeError>;
