//! Process-local circuit breaker: opens after 5 consecutive failures,
//! moves to half-open after 300s, and closes again on the first success
//! in half-open. Wraps any `LlmBackend` the same way `BudgetedBackend`
//! wraps a backend for a cross-cutting concern in `xchecker-llm`, except
//! here the wrapped concern is failure isolation rather than a call
//! budget. State is an `Arc<Mutex<...>>` shared only within this process
//! — there is no cross-process or cross-worker coordination.

use crate::backend::LlmBackend;
use crate::types::{LlmInvocation, LlmResult};
use async_trait::async_trait;
use docpipe_utils::{DocpipeError, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
const DEFAULT_HALF_OPEN_AFTER: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Wraps an [`LlmBackend`] with failure-isolation state.
pub struct CircuitBreakingBackend {
    inner: Box<dyn LlmBackend>,
    failure_threshold: u32,
    half_open_after: Duration,
    state: Arc<Mutex<BreakerInner>>,
}

impl CircuitBreakingBackend {
    #[must_use]
    pub fn new(inner: Box<dyn LlmBackend>) -> Self {
        Self::with_thresholds(inner, DEFAULT_FAILURE_THRESHOLD, DEFAULT_HALF_OPEN_AFTER)
    }

    #[must_use]
    pub fn with_thresholds(
        inner: Box<dyn LlmBackend>,
        failure_threshold: u32,
        half_open_after: Duration,
    ) -> Self {
        Self {
            inner,
            failure_threshold,
            half_open_after,
            state: Arc::new(Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            })),
        }
    }
}

#[async_trait]
impl LlmBackend for CircuitBreakingBackend {
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult> {
        {
            let mut guard = self.state.lock().await;
            if guard.state == BreakerState::Open {
                let elapsed = guard
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.half_open_after {
                    guard.state = BreakerState::HalfOpen;
                } else {
                    return Err(DocpipeError::Llm(
                        "circuit breaker open: LLM backend recently failed repeatedly".into(),
                    ));
                }
            }
        }

        match self.inner.invoke(inv).await {
            Ok(result) => {
                let mut guard = self.state.lock().await;
                guard.state = BreakerState::Closed;
                guard.consecutive_failures = 0;
                guard.opened_at = None;
                Ok(result)
            }
            Err(err) => {
                let mut guard = self.state.lock().await;
                guard.consecutive_failures += 1;
                if guard.state == BreakerState::HalfOpen
                    || guard.consecutive_failures >= self.failure_threshold
                {
                    guard.state = BreakerState::Open;
                    guard.opened_at = Some(Instant::now());
                }
                Err(err)
            }
        }
    }
}
