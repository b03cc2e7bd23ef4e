//! Shared plumbing for the docpipe workspace: error taxonomy, exit codes,
//! logging setup, and small filesystem helpers used by several crates.

pub mod error;
pub mod logging;
pub mod process;

pub use error::{DocpipeError, ExitCode, Result};
