//! `Fallback` — tries an ordered list of alternatives after a recoverable
//! failure.

use async_trait::async_trait;
use conduit_core::{Connection, ConnectionType, Primitive, PrimitiveMeta, WorkflowContext, WorkflowError};
use conduit_otel::Telemetry;
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument as _;

/// A predicate deciding whether a particular fallback should be attempted
/// for the error that just occurred. `None` means "always attempt, as
/// long as the prior failure was recoverable".
pub type FallbackPredicate = Arc<dyn Fn(&WorkflowError) -> bool + Send + Sync>;

/// Attempts `primary`, then each `fallback` in order, stopping at the
/// first success. A fallback is only attempted if the previous failure in
/// the chain was recoverable; if a per-fallback predicate is configured
/// and returns `false` for the observed error, that fallback is skipped
/// (the next one is still tried against the same error).
///
/// With zero fallbacks configured, `Fallback` degenerates to the primary
/// exactly (spec.md §8 round-trip law).
pub struct Fallback {
    children: Vec<Arc<dyn Primitive>>,
    predicates: Vec<Option<FallbackPredicate>>,
    telemetry: Option<Telemetry>,
}

impl Fallback {
    /// Build a `Fallback` attempting `primary` first, then each of
    /// `fallbacks` in order, with no per-fallback predicates configured.
    #[must_use]
    pub fn new(primary: Arc<dyn Primitive>, fallbacks: Vec<Arc<dyn Primitive>>) -> Self {
        let predicates = fallbacks.iter().map(|_| None).collect();
        let mut children = vec![primary];
        children.extend(fallbacks);
        Self {
            children,
            predicates,
            telemetry: None,
        }
    }

    /// Configure a predicate for the fallback at `fallback_index` (0-based,
    /// counting only the fallbacks, not the primary): if it returns
    /// `false` for the error that triggered this position, that fallback
    /// is skipped in favor of the next one.
    #[must_use]
    pub fn with_predicate(
        mut self,
        fallback_index: usize,
        predicate: impl Fn(&WorkflowError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.predicates[fallback_index] = Some(Arc::new(predicate));
        self
    }

    /// Record fallback-type connection edges against `telemetry`.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }
}

#[async_trait]
impl Primitive for Fallback {
    async fn execute(&self, input: Value, context: &WorkflowContext) -> Result<Value, WorkflowError> {
        let chain_length = self.children.len();
        let mut last_error: Option<WorkflowError> = None;
        let mut prev_primitive_type: Option<String> = None;

        for (position, child) in self.children.iter().enumerate() {
            if position > 0 {
                let err = last_error.as_ref().expect("a prior attempt failed to reach position > 0");
                if !err.is_recoverable() {
                    break;
                }
                if let Some(Some(predicate)) = self.predicates.get(position - 1) {
                    if !predicate(err) {
                        continue;
                    }
                }
                if let Some(telemetry) = &self.telemetry {
                    telemetry.record_connection(&Connection::new(
                        prev_primitive_type.clone().unwrap_or_default(),
                        child.meta().primitive_type.clone(),
                        ConnectionType::Fallback,
                    ));
                }
            }

            let span = tracing::info_span!(
                "primitive.fallback.attempt",
                fallback.position = position,
                fallback.chain_length = chain_length,
            );
            let child_ctx = context.child(format!("fallback-{position}"));
            let child_type = child.meta().primitive_type;

            match child.execute(input.clone(), &child_ctx).instrument(span).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    prev_primitive_type = Some(child_type.clone());
                    last_error = Some(e.into_child(child_type));
                }
            }
        }

        Err(last_error.expect("Fallback always attempts at least the primary"))
    }

    fn meta(&self) -> PrimitiveMeta {
        PrimitiveMeta::new("fallback")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::test_utils::{Echo, FailingPrimitive};

    fn returns(value: Value) -> Arc<dyn Primitive> {
        struct ReturnConstant(Value);
        #[async_trait]
        impl Primitive for ReturnConstant {
            async fn execute(&self, _input: Value, _context: &WorkflowContext) -> Result<Value, WorkflowError> {
                Ok(self.0.clone())
            }
            fn meta(&self) -> PrimitiveMeta {
                PrimitiveMeta::new("return_constant")
            }
        }
        Arc::new(ReturnConstant(value))
    }

    #[tokio::test]
    async fn degenerates_to_primary_with_no_fallbacks() {
        let fallback = Fallback::new(Arc::new(Echo), vec![]);
        let ctx = WorkflowContext::new("wf-1");
        let out = fallback.execute(serde_json::json!(7), &ctx).await.unwrap();
        assert_eq!(out, serde_json::json!(7));
    }

    #[tokio::test]
    async fn falls_through_chain_to_first_success() {
        let telemetry = Telemetry::new().unwrap();
        let fallback = Fallback::new(
            Arc::new(FailingPrimitive::new("boom")),
            vec![Arc::new(FailingPrimitive::new("boom2")), returns(serde_json::json!(42))],
        )
        .with_telemetry(telemetry.clone());
        let ctx = WorkflowContext::new("wf-1");

        let out = fallback.execute(serde_json::json!(null), &ctx).await.unwrap();
        assert_eq!(out, serde_json::json!(42));

        assert_eq!(
            telemetry
                .connection_count
                .with_label_values(&["failing", "failing", "fallback"])
                .get(),
            1.0
        );
        assert_eq!(
            telemetry
                .connection_count
                .with_label_values(&["failing", "return_constant", "fallback"])
                .get(),
            1.0
        );
    }

    #[tokio::test]
    async fn all_failing_raises_last_error() {
        let fallback = Fallback::new(
            Arc::new(FailingPrimitive::new("first")),
            vec![Arc::new(FailingPrimitive::new("second"))],
        );
        let ctx = WorkflowContext::new("wf-1");
        let err = fallback.execute(serde_json::json!(null), &ctx).await.unwrap_err();
        assert_eq!(err.error_type(), "child_error");
    }

    #[tokio::test]
    async fn predicate_can_skip_a_fallback() {
        let fallback = Fallback::new(
            Arc::new(FailingPrimitive::new("boom")),
            vec![Arc::new(FailingPrimitive::new("skip-me")), returns(serde_json::json!("last"))],
        )
        .with_predicate(0, |_e| false);
        let ctx = WorkflowContext::new("wf-1");
        let out = fallback.execute(serde_json::json!(null), &ctx).await.unwrap();
        assert_eq!(out, serde_json::json!("last"));
    }
}
