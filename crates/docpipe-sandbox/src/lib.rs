//! User pipeline-script execution sandbox: wraps a rule's operator
//! script in a fixed harness, runs it as an argv-only subprocess with a
//! hard timeout, and exposes the doubling retry-delay envelope used
//! when a run fails.

mod executor;
mod harness;
mod retry;

pub use executor::{execute, SandboxInput};
pub use retry::next_delay;
