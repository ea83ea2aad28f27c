//! `Timeout` — races a child execution against a timer.

use async_trait::async_trait;
use conduit_core::{DurationMs, Primitive, PrimitiveMeta, WorkflowContext, WorkflowError};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::Instrument as _;

/// What [`Timeout`] does when its timer fires before the child returns.
#[derive(Debug, Clone)]
pub enum OnTimeout {
    /// Surface a [`WorkflowError::Timeout`].
    Raise,
    /// Return this value instead of failing.
    ReturnDefault(Value),
}

/// Races a child execution against a `timeout_ms` timer. If the timer
/// fires first, the child task is cooperatively cancelled (dropped) and
/// the primitive either raises `timeout_error` or returns a configured
/// default, per [`OnTimeout`].
pub struct Timeout {
    child: Arc<dyn Primitive>,
    timeout: DurationMs,
    on_timeout: OnTimeout,
}

impl Timeout {
    /// Build a `Timeout` wrapping `child` with a `timeout_ms` budget.
    /// Defaults to raising `timeout_error` on expiry.
    #[must_use]
    pub fn new(child: Arc<dyn Primitive>, timeout_ms: DurationMs) -> Self {
        Self {
            child,
            timeout: timeout_ms,
            on_timeout: OnTimeout::Raise,
        }
    }

    /// Return `default` instead of raising when the timer fires.
    #[must_use]
    pub fn or_default(mut self, default: Value) -> Self {
        self.on_timeout = OnTimeout::ReturnDefault(default);
        self
    }
}

#[async_trait]
impl Primitive for Timeout {
    async fn execute(&self, input: Value, context: &WorkflowContext) -> Result<Value, WorkflowError> {
        let start = Instant::now();
        let child_ctx = context.child("timeout-child");

        let span = tracing::info_span!(
            "primitive.timeout.execute",
            timeout.ms = self.timeout.as_millis(),
            timeout.expired = tracing::field::Empty,
            timeout.elapsed_ms = tracing::field::Empty,
        );

        // The await and the post-await field recording both need to live
        // inside the instrumented block (rather than holding a `span.enter()`
        // guard, which is `!Send` and can't cross this `async-trait` future's
        // await point); `Instrument` re-enters the span on every poll, so
        // `Span::current()` still resolves correctly here.
        async move {
            let outcome = tokio::time::timeout(self.timeout.to_std(), self.child.execute(input, &child_ctx)).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            match outcome {
                Ok(result) => {
                    tracing::Span::current().record("timeout.expired", false);
                    tracing::Span::current().record("timeout.elapsed_ms", elapsed_ms);
                    result.map_err(|e| e.into_child(self.child.meta().primitive_type))
                }
                Err(_elapsed) => {
                    tracing::Span::current().record("timeout.expired", true);
                    tracing::Span::current().record("timeout.elapsed_ms", elapsed_ms);
                    match &self.on_timeout {
                        OnTimeout::Raise => Err(WorkflowError::Timeout(self.timeout)),
                        OnTimeout::ReturnDefault(default) => Ok(default.clone()),
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    fn meta(&self) -> PrimitiveMeta {
        PrimitiveMeta::new("timeout")
    }
}
