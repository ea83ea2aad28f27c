//! `CircuitBreaker` — fast-fails a child once it has failed enough to be
//! considered unhealthy, and probes recovery after a cooldown.

use async_trait::async_trait;
use conduit_core::{DurationMs, Primitive, PrimitiveMeta, WorkflowContext, WorkflowError};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tracing::Instrument as _;

/// The three states of the breaker's state machine (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests pass through; failures are counted.
    Closed,
    /// Requests fast-fail with [`WorkflowError::CircuitOpen`] without
    /// reaching the child.
    Open,
    /// A single probe request is allowed through to test recovery.
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Wraps a child primitive with a closed/open/half-open breaker. Opens
/// after `failure_threshold` consecutive failures; once `recovery_timeout`
/// has elapsed since opening, the next request is admitted as a single
/// probe (half-open). The probe's outcome either closes the breaker
/// (success, resetting the failure count) or re-opens it (failure,
/// restarting the recovery timer).
pub struct CircuitBreaker {
    child: Arc<dyn Primitive>,
    failure_threshold: u32,
    recovery_timeout: DurationMs,
    inner: Mutex<Inner>,
}

/// Whether a given call was admitted as a plain request or as the single
/// half-open probe — only a probe's outcome drives a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Allowed,
    Probe,
    Rejected,
}

impl CircuitBreaker {
    /// Build a `CircuitBreaker` wrapping `child`, opening after
    /// `failure_threshold` consecutive failures and probing recovery once
    /// `recovery_timeout` has elapsed since opening.
    #[must_use]
    pub fn new(child: Arc<dyn Primitive>, failure_threshold: u32, recovery_timeout: DurationMs) -> Self {
        Self {
            child,
            failure_threshold,
            recovery_timeout,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// The breaker's current state, without side effects.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    fn admit(&self) -> Admission {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Admission::Rejected
                } else {
                    inner.probe_in_flight = true;
                    Admission::Probe
                }
            }
            CircuitState::Open => {
                let recovered = inner
                    .opened_at
                    .is_some_and(|opened_at| opened_at.elapsed() >= self.recovery_timeout.to_std());
                if recovered {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
        }
    }

    fn record_success(&self, admission: Admission) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures = 0;
        if admission == Admission::Probe {
            inner.probe_in_flight = false;
            inner.state = CircuitState::Closed;
            inner.opened_at = None;
        }
    }

    fn record_failure(&self, admission: Admission) {
        let mut inner = self.inner.lock().unwrap();
        if admission == Admission::Probe {
            inner.probe_in_flight = false;
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
            return;
        }
        inner.consecutive_failures += 1;
        if inner.state == CircuitState::Closed && inner.consecutive_failures >= self.failure_threshold {
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }
}

#[async_trait]
impl Primitive for CircuitBreaker {
    async fn execute(&self, input: Value, context: &WorkflowContext) -> Result<Value, WorkflowError> {
        let admission = self.admit();

        let span = tracing::info_span!(
            "primitive.circuit_breaker.execute",
            circuit.state = ?self.state(),
            circuit.probe = admission == Admission::Probe,
        );

        if admission == Admission::Rejected {
            let _entered = span.enter();
            tracing::debug!("circuit open, fast-failing");
            return Err(WorkflowError::CircuitOpen);
        }

        let child_ctx = context.child("circuit-breaker-child");
        match self.child.execute(input, &child_ctx).instrument(span).await {
            Ok(value) => {
                self.record_success(admission);
                Ok(value)
            }
            Err(e) => {
                self.record_failure(admission);
                Err(e.into_child(self.child.meta().primitive_type))
            }
        }
    }

    fn meta(&self) -> PrimitiveMeta {
        PrimitiveMeta::new("circuit_breaker")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::test_utils::{Echo, FailingPrimitive, FlakyPrimitive};

    #[tokio::test]
    async fn stays_closed_below_the_failure_threshold() {
        let breaker = CircuitBreaker::new(Arc::new(FailingPrimitive::new("boom")), 3, DurationMs::from_secs(1));
        let ctx = WorkflowContext::new("wf-1");
        for _ in 0..2 {
            let _ = breaker.execute(serde_json::json!(1), &ctx).await;
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn opens_after_the_failure_threshold_and_fast_fails() {
        let breaker = CircuitBreaker::new(Arc::new(FailingPrimitive::new("boom")), 2, DurationMs::from_secs(60));
        let ctx = WorkflowContext::new("wf-1");
        for _ in 0..2 {
            let _ = breaker.execute(serde_json::json!(1), &ctx).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        let err = breaker.execute(serde_json::json!(1), &ctx).await.unwrap_err();
        assert_eq!(err.error_type(), "circuit_open_error");
        assert!(err.is_recoverable());
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_probe_success_closes_the_breaker() {
        let flaky = Arc::new(FlakyPrimitive::new(1));
        let breaker = CircuitBreaker::new(flaky, 1, DurationMs::from_millis(50));
        let ctx = WorkflowContext::new("wf-1");

        let err = breaker.execute(serde_json::json!(1), &ctx).await.unwrap_err();
        assert_eq!(err.error_type(), "child_error");
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(std::time::Duration::from_millis(60)).await;

        let out = breaker.execute(serde_json::json!(1), &ctx).await.unwrap();
        assert_eq!(out, serde_json::json!(1));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_probe_failure_reopens_the_breaker() {
        let breaker = CircuitBreaker::new(Arc::new(FailingPrimitive::new("still down")), 1, DurationMs::from_millis(50));
        let ctx = WorkflowContext::new("wf-1");

        let _ = breaker.execute(serde_json::json!(1), &ctx).await;
        assert_eq!(breaker.state(), CircuitState::Open);

        tokio::time::advance(std::time::Duration::from_millis(60)).await;
        let _ = breaker.execute(serde_json::json!(1), &ctx).await;
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn success_resets_the_consecutive_failure_count() {
        let breaker = CircuitBreaker::new(Arc::new(Echo), 2, DurationMs::from_secs(1));
        let ctx = WorkflowContext::new("wf-1");
        let out = breaker.execute(serde_json::json!("ok"), &ctx).await.unwrap();
        assert_eq!(out, serde_json::json!("ok"));
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
