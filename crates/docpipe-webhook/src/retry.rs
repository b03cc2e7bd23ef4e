//! Push retry envelope: a configured delay curve (default `[10, 30, 90]`
//! seconds) rather than the doubling curve `docpipe-sandbox` uses,
//! ported from `push_service.py`'s `calculate_retry_delay`/`should_retry`.

use std::time::Duration;

/// Delay before retry attempt number `retry_count` (0-based, the first
/// retry after an initial failed attempt is `retry_count = 0`). Beyond
/// the configured curve, holds at the last entry. Falls back to zero
/// delay if the curve is empty.
#[must_use]
pub fn next_delay(retry_count: u32, delays_secs: &[u64]) -> Duration {
    let secs = delays_secs
        .get(retry_count as usize)
        .or_else(|| delays_secs.last())
        .copied()
        .unwrap_or(0);
    Duration::from_secs(secs)
}

/// Whether a failed push should be retried. 4xx responses other than
/// 429 (rate limiting) are treated as permanent client errors and are
/// not retried; everything else (5xx, timeouts, network errors) is
/// retried until `retry_count` reaches `max_retries`.
#[must_use]
pub fn should_retry(success: bool, http_status: Option<u16>, retry_count: u32, max_retries: u32) -> bool {
    if success {
        return false;
    }
    if retry_count >= max_retries {
        return false;
    }
    if let Some(status) = http_status {
        if (400..500).contains(&status) && status != 429 {
            return false;
        }
    }
    true
}
