//! `Retry` — re-attempts a failing child with configurable backoff.

use async_trait::async_trait;
use conduit_core::{DurationMs, Primitive, PrimitiveMeta, WorkflowContext, WorkflowError};
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument as _;

/// Which backoff curve [`Retry`] uses to compute the delay before each
/// re-attempt, from the base delay at attempt `k` (spec.md §4.3):
/// constant always uses `initial_delay_ms`; linear scales by `k + 1`;
/// exponential scales by `backoff_factor.powi(k)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffStrategy {
    /// Every retry waits `initial_delay_ms`.
    Constant,
    /// Retry `k` waits `initial_delay_ms * (k + 1)`.
    Linear,
    /// Retry `k` waits `initial_delay_ms * backoff_factor.powi(k)`.
    Exponential,
}

/// A predicate deciding whether a given error should trigger another
/// attempt. Defaults to [`WorkflowError::is_recoverable`].
pub type RetryPredicate = Arc<dyn Fn(&WorkflowError) -> bool + Send + Sync>;

/// Re-attempts a wrapped child up to `max_retries` additional times after
/// its first failure, sleeping between attempts according to
/// [`BackoffStrategy`].
///
/// Total attempts made on a child that always fails is `max_retries + 1`.
/// `max_retries = 0` degenerates to a single, unretried attempt.
pub struct Retry {
    child: Arc<dyn Primitive>,
    max_retries: u32,
    strategy: BackoffStrategy,
    initial_delay: DurationMs,
    backoff_factor: f64,
    jitter: bool,
    max_delay: DurationMs,
    retry_on: RetryPredicate,
}

impl Retry {
    /// Build a `Retry` wrapping `child`, attempting at most `max_retries`
    /// additional times beyond the first, with exponential backoff
    /// starting at `initial_delay` and a default factor of `2.0`, jitter
    /// enabled, and no delay cap beyond `initial_delay * 2^max_retries`.
    #[must_use]
    pub fn new(child: Arc<dyn Primitive>, max_retries: u32, initial_delay: DurationMs) -> Self {
        Self {
            child,
            max_retries,
            strategy: BackoffStrategy::Exponential,
            initial_delay,
            backoff_factor: 2.0,
            jitter: true,
            max_delay: DurationMs::from_secs(30),
            retry_on: Arc::new(WorkflowError::is_recoverable),
        }
    }

    /// Override the backoff curve.
    #[must_use]
    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Override the exponential backoff factor (ignored by other
    /// strategies).
    #[must_use]
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Disable additive jitter. Jitter is additive uniform noise up to one
    /// more base delay (spec.md §4.3); disabling it makes the delay
    /// sequence exactly the base curve.
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Cap the computed delay, regardless of strategy or jitter.
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: DurationMs) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Override which errors are eligible for another attempt. Defaults to
    /// [`WorkflowError::is_recoverable`].
    #[must_use]
    pub fn retry_on(mut self, predicate: impl Fn(&WorkflowError) -> bool + Send + Sync + 'static) -> Self {
        self.retry_on = Arc::new(predicate);
        self
    }

    fn base_delay_ms(&self, attempt: u32) -> f64 {
        let initial = self.initial_delay.as_millis() as f64;
        match self.strategy {
            BackoffStrategy::Constant => initial,
            BackoffStrategy::Linear => initial * f64::from(attempt + 1),
            BackoffStrategy::Exponential => initial * self.backoff_factor.powi(attempt as i32),
        }
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms(attempt);
        let jittered = if self.jitter {
            base + rand::thread_rng().gen_range(0.0..1.0) * base
        } else {
            base
        };
        let capped = jittered.min(self.max_delay.as_millis() as f64);
        Duration::from_secs_f64(capped.max(0.0) / 1000.0)
    }
}

#[async_trait]
impl Primitive for Retry {
    async fn execute(&self, input: Value, context: &WorkflowContext) -> Result<Value, WorkflowError> {
        let mut attempt = 0u32;
        loop {
            let span = tracing::info_span!(
                "primitive.retry.attempt",
                otel.name = %PrimitiveMeta::new("retry").step_span(format!("attempt_{attempt}")),
                retry.attempt = attempt,
            );
            let child_ctx = context.child(format!("retry-attempt-{attempt}"));
            let result = self
                .child
                .execute(input.clone(), &child_ctx)
                .instrument(span)
                .await;

            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let exhausted = attempt == self.max_retries;
                    let eligible = (self.retry_on)(&e);
                    if exhausted || !eligible {
                        return Err(e.into_child(self.child.meta().primitive_type));
                    }
                    let delay = self.delay_for_attempt(attempt);
                    tracing::debug!(retry.attempt = attempt, delay_ms = delay.as_millis() as u64, "retrying after delay");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn meta(&self) -> PrimitiveMeta {
        PrimitiveMeta::new("retry")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::test_utils::{Echo, FailingPrimitive, FlakyPrimitive};

    #[tokio::test]
    async fn max_retries_zero_invokes_child_exactly_once() {
        let flaky = Arc::new(FlakyPrimitive::new(1));
        let retry = Retry::new(flaky.clone(), 0, DurationMs::from_millis(1)).without_jitter();
        let ctx = WorkflowContext::new("wf-1");

        let err = retry.execute(serde_json::json!(1), &ctx).await.unwrap_err();
        assert_eq!(err.error_type(), "child_error");
        assert_eq!(flaky.attempts(), 1);
    }

    #[tokio::test]
    async fn succeeds_on_attempt_k_invokes_child_k_plus_one_times() {
        let flaky = Arc::new(FlakyPrimitive::new(2));
        let retry = Retry::new(flaky.clone(), 5, DurationMs::from_millis(1)).without_jitter();
        let ctx = WorkflowContext::new("wf-1");

        let out = retry.execute(serde_json::json!(42), &ctx).await.unwrap();
        assert_eq!(out, serde_json::json!(42));
        assert_eq!(flaky.attempts(), 3);
    }

    #[tokio::test]
    async fn always_failing_child_invoked_max_retries_plus_one_times_then_raises() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counting = Arc::new(conduit_core::test_utils::CountingEcho::new(Arc::clone(&calls)));
        let always_fails = Arc::new(FailingAfterCount::new(counting));
        let retry = Retry::new(always_fails, 3, DurationMs::from_millis(1))
            .without_jitter()
            .retry_on(|_| true);
        let ctx = WorkflowContext::new("wf-1");

        let err = retry.execute(serde_json::json!(1), &ctx).await.unwrap_err();
        assert_eq!(err.error_type(), "child_error");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn non_recoverable_error_is_not_retried() {
        let retry = Retry::new(Arc::new(FailingPrimitive::new("bad input")), 5, DurationMs::from_millis(1));
        let ctx = WorkflowContext::new("wf-1");
        let err = retry.execute(serde_json::json!(1), &ctx).await.unwrap_err();
        // FailingPrimitive raises WorkflowError::Validation, not recoverable by default.
        assert_eq!(err.error_type(), "child_error");
    }

    #[tokio::test]
    async fn success_does_not_retry() {
        let retry = Retry::new(Arc::new(Echo), 3, DurationMs::from_millis(1));
        let ctx = WorkflowContext::new("wf-1");
        let out = retry.execute(serde_json::json!("ok"), &ctx).await.unwrap();
        assert_eq!(out, serde_json::json!("ok"));
    }

    #[test]
    fn delay_sequence_is_monotonic_up_to_cap() {
        let retry = Retry::new(Arc::new(Echo), 10, DurationMs::from_millis(10))
            .with_strategy(BackoffStrategy::Exponential)
            .with_backoff_factor(2.0)
            .without_jitter()
            .with_max_delay(DurationMs::from_millis(100));

        let delays: Vec<u128> = (0..6).map(|k| retry.delay_for_attempt(k).as_millis()).collect();
        assert_eq!(delays, vec![10, 20, 40, 80, 100, 100]);
    }

    #[test]
    fn exponential_jitter_stays_within_the_documented_window() {
        let retry = Retry::new(Arc::new(Echo), 10, DurationMs::from_millis(10))
            .with_strategy(BackoffStrategy::Exponential)
            .with_backoff_factor(2.0)
            .with_max_delay(DurationMs::from_millis(10_000));

        for _ in 0..50 {
            let d0 = retry.delay_for_attempt(0).as_millis();
            assert!((10..20).contains(&d0), "attempt 0 delay {d0} out of [10, 20)");
            let d1 = retry.delay_for_attempt(1).as_millis();
            assert!((20..40).contains(&d1), "attempt 1 delay {d1} out of [20, 40)");
        }
    }

    /// A primitive that always fails, wrapping a counter so call count can
    /// be observed without depending on `FailingPrimitive`'s own count.
    struct FailingAfterCount {
        inner: Arc<conduit_core::test_utils::CountingEcho>,
    }

    impl FailingAfterCount {
        fn new(inner: Arc<conduit_core::test_utils::CountingEcho>) -> Self {
            Self { inner }
        }
    }

    #[async_trait]
    impl Primitive for FailingAfterCount {
        async fn execute(&self, input: Value, context: &WorkflowContext) -> Result<Value, WorkflowError> {
            self.inner.execute(input, context).await?;
            Err(WorkflowError::Cancelled)
        }

        fn meta(&self) -> PrimitiveMeta {
            PrimitiveMeta::new("failing_after_count")
        }
    }
}
