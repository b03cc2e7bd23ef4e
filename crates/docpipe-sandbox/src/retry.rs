//! Doubling retry-delay envelope for sandbox execution failures,
//! parameterized by `docpipe_config::SandboxConfig`'s
//! `retry_delay_cap_secs`. The authoritative retry count lives on the
//! queue message (`docpipe-queue`'s `retry_count`), not here — this
//! module only computes how long to delay the next attempt.

use std::time::Duration;

const BASE_DELAY_SECS: u64 = 10;

/// Delay before retry attempt number `attempt` (1-indexed: the first
/// retry is `attempt = 1`), doubling from [`BASE_DELAY_SECS`] and capped
/// at `cap_secs`.
#[must_use]
pub fn next_delay(attempt: u32, cap_secs: u64) -> Duration {
    let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
    let secs = BASE_DELAY_SECS.saturating_mul(factor).min(cap_secs);
    Duration::from_secs(secs)
}
