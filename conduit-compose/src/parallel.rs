//! Parallel fan-out composition.

use conduit_core::{Connection, ConnectionType, Primitive, PrimitiveMeta, WorkflowContext, WorkflowError};
use conduit_otel::Telemetry;
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument as _;

fn error_to_json(e: &WorkflowError) -> Value {
    serde_json::json!({
        "type": e.error_type(),
        "message": e.to_string(),
        "recoverable": e.is_recoverable(),
    })
}

/// Dispatches the same input to every child concurrently.
///
/// By default the primitive is fail-fast: the first child error cancels
/// the remaining in-flight children and is surfaced as the primitive's
/// own error. In [`Parallel::collect_errors`] mode the primitive never
/// fails itself; every child runs to completion and the result is a JSON
/// array of per-child outcomes, each either `{"ok": <value>}` or
/// `{"error": {"type", "message", "recoverable"}}`, in child order.
///
/// One connection edge of type `parallel` is recorded from the parallel
/// node to each child, regardless of outcome — a fan-out over *m* children
/// always records exactly *m* edges.
pub struct Parallel {
    children: Vec<Arc<dyn Primitive>>,
    collect_errors: bool,
    telemetry: Option<Telemetry>,
}

impl Parallel {
    /// Build a fan-out over `children`, fail-fast by default.
    #[must_use]
    pub fn new(children: Vec<Arc<dyn Primitive>>) -> Self {
        Self {
            children,
            collect_errors: false,
            telemetry: None,
        }
    }

    /// Switch to collect-errors mode: every child runs to completion and
    /// no child failure fails the primitive itself.
    #[must_use]
    pub fn collect_errors(mut self) -> Self {
        self.collect_errors = true;
        self
    }

    /// Record connection edges against `telemetry` as the fan-out runs.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }
}

#[async_trait::async_trait]
impl Primitive for Parallel {
    async fn execute(
        &self,
        input: Value,
        context: &WorkflowContext,
    ) -> Result<Value, WorkflowError> {
        let self_meta = self.meta();

        for child in &self.children {
            if let Some(telemetry) = &self.telemetry {
                telemetry.record_connection(&Connection::new(
                    self_meta.primitive_type.clone(),
                    child.meta().primitive_type.clone(),
                    ConnectionType::Parallel,
                ));
            }
        }

        let mut set = tokio::task::JoinSet::new();
        for (index, child) in self.children.iter().cloned().enumerate() {
            let child_ctx = context.child(format!("parallel-child-{index}"));
            let child_input = input.clone();
            let step_name = child.meta().primitive_type;
            let span = tracing::info_span!(
                "primitive.parallel.child",
                step.index = index,
                step.name = %step_name,
            );
            set.spawn(
                async move { (index, child.execute(child_input, &child_ctx).await) }.instrument(span),
            );
        }

        if self.collect_errors {
            let mut outcomes: Vec<Option<Value>> = (0..self.children.len()).map(|_| None).collect();
            while let Some(joined) = set.join_next().await {
                let (index, result) = joined.map_err(|e| WorkflowError::Other(Box::new(e)))?;
                outcomes[index] = Some(match result {
                    Ok(value) => serde_json::json!({ "ok": value }),
                    Err(e) => serde_json::json!({ "error": error_to_json(&e) }),
                });
            }
            let ordered = outcomes
                .into_iter()
                .map(|o| o.expect("every child index is filled exactly once"))
                .collect();
            return Ok(Value::Array(ordered));
        }

        let mut values: Vec<Option<Value>> = (0..self.children.len()).map(|_| None).collect();
        let mut first_error: Option<WorkflowError> = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, Ok(value))) => values[index] = Some(value),
                Ok((index, Err(e))) => {
                    if first_error.is_none() {
                        let child_type = self.children[index].meta().primitive_type;
                        first_error = Some(e.into_child(child_type));
                        set.abort_all();
                    }
                }
                Err(join_err) => {
                    if first_error.is_none() {
                        first_error = Some(WorkflowError::Other(Box::new(join_err)));
                        set.abort_all();
                    }
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }

        let ordered = values
            .into_iter()
            .map(|v| v.expect("every child index is filled exactly once on the success path"))
            .collect();
        Ok(Value::Array(ordered))
    }

    fn meta(&self) -> PrimitiveMeta {
        PrimitiveMeta::new("parallel")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::test_utils::{Echo, FailingPrimitive};

    #[tokio::test]
    async fn fans_out_and_preserves_child_order() {
        let telemetry = Telemetry::new().unwrap();
        let parallel =
            Parallel::new(vec![Arc::new(Echo), Arc::new(Echo), Arc::new(Echo)]).with_telemetry(telemetry.clone());
        let ctx = WorkflowContext::new("wf-1");

        let out = parallel.execute(serde_json::json!(7), &ctx).await.unwrap();
        assert_eq!(out, serde_json::json!([7, 7, 7]));

        assert_eq!(
            telemetry
                .connection_count
                .with_label_values(&["parallel", "echo", "parallel"])
                .get(),
            3.0
        );
    }

    #[tokio::test]
    async fn single_child_degenerates_to_a_one_element_list() {
        let parallel = Parallel::new(vec![Arc::new(Echo)]);
        let ctx = WorkflowContext::new("wf-1");
        let out = parallel.execute(serde_json::json!("x"), &ctx).await.unwrap();
        assert_eq!(out, serde_json::json!(["x"]));
    }

    #[tokio::test]
    async fn fail_fast_surfaces_first_error() {
        let parallel = Parallel::new(vec![Arc::new(Echo), Arc::new(FailingPrimitive::new("boom"))]);
        let ctx = WorkflowContext::new("wf-1");
        let err = parallel.execute(serde_json::json!(1), &ctx).await.unwrap_err();
        assert_eq!(err.error_type(), "child_error");
    }

    #[tokio::test]
    async fn collect_errors_never_fails_and_reports_per_child_outcome() {
        let parallel =
            Parallel::new(vec![Arc::new(Echo), Arc::new(FailingPrimitive::new("boom"))]).collect_errors();
        let ctx = WorkflowContext::new("wf-1");
        let out = parallel.execute(serde_json::json!(1), &ctx).await.unwrap();
        let outcomes = out.as_array().unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0], serde_json::json!({"ok": 1}));
        assert!(outcomes[1].get("error").is_some());
    }
}
