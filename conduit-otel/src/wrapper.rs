//! The instrumentation base every concrete primitive is wrapped with.

use crate::Telemetry;
use async_trait::async_trait;
use conduit_core::{Primitive, PrimitiveMeta, WorkflowContext, WorkflowError};
use std::time::Instant;
use tracing::Instrument as _;

/// Wraps any [`Primitive`] with span emission and the execution
/// count/duration/active-workflow metrics from spec.md §4.5.
///
/// This is the only place `execution.count`, `execution.duration`, and
/// `workflows.active` are recorded. Concrete primitives only emit the
/// metrics and span attributes particular to them (connection edges,
/// cache hits, retry attempts, ...) — wrap every composition operator and
/// concrete primitive with `Instrumented` before handing it to a caller.
pub struct Instrumented<P> {
    inner: P,
    telemetry: Option<Telemetry>,
}

impl<P: Primitive> Instrumented<P> {
    /// Wrap `inner`, recording metrics against `telemetry`.
    #[must_use]
    pub fn new(inner: P, telemetry: Telemetry) -> Self {
        Self {
            inner,
            telemetry: Some(telemetry),
        }
    }

    /// Wrap `inner` with metrics recording disabled. Spans are still
    /// emitted (and still no-op without an installed `tracing` subscriber);
    /// only the `Telemetry` side is skipped. Useful in tests that assert on
    /// functional behavior and don't care about observability.
    #[must_use]
    pub fn uninstrumented(inner: P) -> Self {
        Self {
            inner,
            telemetry: None,
        }
    }

    /// Borrow the wrapped primitive.
    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: Primitive> Primitive for Instrumented<P> {
    async fn execute(
        &self,
        input: serde_json::Value,
        context: &WorkflowContext,
    ) -> Result<serde_json::Value, WorkflowError> {
        let meta = self.inner.meta();
        let span_name = meta.span_name();
        // A context with no parent span reference is the outer boundary of
        // a workflow — everything else was forked via `WorkflowContext::child`.
        let is_outermost = context.parent_span_reference.is_none();
        let workflow_name = context.workflow_name.as_deref().unwrap_or("");
        let agent_type = context.agent_type.as_deref().unwrap_or("");

        if is_outermost {
            if let Some(t) = &self.telemetry {
                t.workflow_started(workflow_name, agent_type);
            }
        }

        let span = tracing::info_span!(
            "primitive.execute",
            otel.name = %span_name,
            primitive.r#type = %meta.primitive_type,
            primitive.name = %meta.name,
            primitive.action = %meta.action,
            workflow.id = %context.workflow_id,
            workflow.name = tracing::field::Empty,
            agent.id = tracing::field::Empty,
            agent.r#type = tracing::field::Empty,
            llm.provider = tracing::field::Empty,
            llm.model_name = tracing::field::Empty,
            llm.model_tier = tracing::field::Empty,
            metadata = tracing::field::Empty,
        );

        // Only non-empty descriptors and tags are recorded, per spec.md §3's
        // span attribute slots — an absent field doesn't appear at all
        // rather than showing up as an empty string.
        if let Some(v) = &context.workflow_name {
            span.record("workflow.name", v.as_str());
        }
        if let Some(v) = &context.agent_id {
            span.record("agent.id", v.as_str());
        }
        if let Some(v) = &context.agent_type {
            span.record("agent.r#type", v.as_str());
        }
        if let Some(v) = &context.llm_provider {
            span.record("llm.provider", v.as_str());
        }
        if let Some(v) = &context.llm_model_name {
            span.record("llm.model_name", v.as_str());
        }
        if let Some(v) = &context.llm_model_tier {
            span.record("llm.model_tier", v.as_str());
        }
        if !context.metadata.is_empty() {
            if let Ok(json) = serde_json::to_string(&context.metadata) {
                span.record("metadata", json.as_str());
            }
        }

        let start = Instant::now();
        let result = self.inner.execute(input, context).instrument(span.clone()).await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let (status, error_type) = match &result {
            Ok(_) => ("success", String::new()),
            Err(e) => ("error", e.error_type().to_string()),
        };

        if let Err(e) = &result {
            span.in_scope(|| {
                tracing::error!(
                    error.r#type = %error_type,
                    error.recoverable = e.is_recoverable(),
                    "{e}"
                );
            });
        }

        if let Some(t) = &self.telemetry {
            t.record_execution(
                &meta.name,
                &meta.primitive_type,
                status,
                agent_type,
                &error_type,
                elapsed_ms,
            );
        }

        if is_outermost {
            if let Some(t) = &self.telemetry {
                t.workflow_finished(workflow_name, agent_type);
            }
        }

        result
    }

    fn meta(&self) -> PrimitiveMeta {
        self.inner.meta()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Primitive for Echo {
        async fn execute(
            &self,
            input: serde_json::Value,
            _context: &WorkflowContext,
        ) -> Result<serde_json::Value, WorkflowError> {
            Ok(input)
        }

        fn meta(&self) -> PrimitiveMeta {
            PrimitiveMeta::new("echo")
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl Primitive for AlwaysFails {
        async fn execute(
            &self,
            _input: serde_json::Value,
            _context: &WorkflowContext,
        ) -> Result<serde_json::Value, WorkflowError> {
            Err(WorkflowError::Validation("bad input".into()))
        }

        fn meta(&self) -> PrimitiveMeta {
            PrimitiveMeta::new("always_fails")
        }
    }

    struct NamedCacheLike;

    #[async_trait]
    impl Primitive for NamedCacheLike {
        async fn execute(
            &self,
            input: serde_json::Value,
            _context: &WorkflowContext,
        ) -> Result<serde_json::Value, WorkflowError> {
            Ok(input)
        }

        fn meta(&self) -> PrimitiveMeta {
            PrimitiveMeta::new("cache").with_name("prompt_cache")
        }
    }

    #[tokio::test]
    async fn execution_count_uses_name_and_type_as_distinct_labels() {
        let telemetry = Telemetry::new().unwrap();
        let wrapped = Instrumented::new(NamedCacheLike, telemetry.clone());
        let ctx = WorkflowContext::new("wf-1");

        wrapped.execute(serde_json::json!(1), &ctx).await.unwrap();

        let count = telemetry
            .execution_count
            .with_label_values(&["prompt_cache", "cache", "success", "", ""])
            .get();
        assert_eq!(count, 1.0);
    }

    #[tokio::test]
    async fn records_success_execution_count_and_duration() {
        let telemetry = Telemetry::new().unwrap();
        let wrapped = Instrumented::new(Echo, telemetry.clone());
        let ctx = WorkflowContext::new("wf-1");

        let out = wrapped.execute(serde_json::json!({"q": "hi"}), &ctx).await.unwrap();
        assert_eq!(out, serde_json::json!({"q": "hi"}));

        let count = telemetry
            .execution_count
            .with_label_values(&["echo", "echo", "success", "", ""])
            .get();
        assert_eq!(count, 1.0);
    }

    #[tokio::test]
    async fn records_error_execution_count_with_error_type() {
        let telemetry = Telemetry::new().unwrap();
        let wrapped = Instrumented::new(AlwaysFails, telemetry.clone());
        let ctx = WorkflowContext::new("wf-1");

        let err = wrapped.execute(serde_json::json!(null), &ctx).await.unwrap_err();
        assert_eq!(err.error_type(), "validation_error");

        let count = telemetry
            .execution_count
            .with_label_values(&["always_fails", "always_fails", "error", "", "validation_error"])
            .get();
        assert_eq!(count, 1.0);
    }

    #[tokio::test]
    async fn workflows_active_tracks_only_outermost_calls() {
        let telemetry = Telemetry::new().unwrap();
        let wrapped = Instrumented::new(Echo, telemetry.clone());
        let outer_ctx = WorkflowContext::new("wf-1").with_workflow_name("demo");
        let inner_ctx = outer_ctx.child("span-1");

        let outer_fut = wrapped.execute(serde_json::json!(1), &outer_ctx);
        let inner_fut = wrapped.execute(serde_json::json!(1), &inner_ctx);
        let (_, _) = tokio::join!(outer_fut, inner_fut);

        // Both calls completed; the gauge must have returned to zero.
        assert_eq!(telemetry.workflows_active.with_label_values(&["demo", ""]).get(), 0.0);
    }
}
