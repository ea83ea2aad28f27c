//! Sequential chain composition.

use conduit_core::{Connection, ConnectionType, Primitive, PrimitiveMeta, WorkflowContext, WorkflowError};
use conduit_otel::Telemetry;
use std::sync::Arc;
use tracing::Instrument as _;

/// Threads the output of each child into the input of the next.
///
/// Children are awaited strictly in order — child *i+1* is not scheduled
/// until child *i* has returned. One connection edge of type `sequential`
/// is recorded from child *i-1* to child *i* for every `i > 0`; a chain of
/// *n* children therefore records exactly `n - 1` edges per execution.
pub struct Sequential {
    children: Vec<Arc<dyn Primitive>>,
    telemetry: Option<Telemetry>,
}

impl Sequential {
    /// Build a chain over `children`, executed in the given order.
    #[must_use]
    pub fn new(children: Vec<Arc<dyn Primitive>>) -> Self {
        Self {
            children,
            telemetry: None,
        }
    }

    /// Record connection edges against `telemetry` as the chain runs.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }
}

#[async_trait::async_trait]
impl Primitive for Sequential {
    async fn execute(
        &self,
        input: serde_json::Value,
        context: &WorkflowContext,
    ) -> Result<serde_json::Value, WorkflowError> {
        let mut current = input;
        let mut prev_type: Option<String> = None;

        for (index, child) in self.children.iter().enumerate() {
            let child_meta = child.meta();

            if let Some(prev_type) = &prev_type {
                if let Some(telemetry) = &self.telemetry {
                    telemetry.record_connection(&Connection::new(
                        prev_type.clone(),
                        child_meta.primitive_type.clone(),
                        ConnectionType::Sequential,
                    ));
                }
            }

            let step_span_name = format!("step_{index}");
            let span = tracing::info_span!(
                "primitive.sequential.step",
                otel.name = %PrimitiveMeta::new("sequential").step_span(&step_span_name),
                step.index = index,
                step.name = %child_meta.primitive_type,
            );
            let child_ctx = context.child(step_span_name);

            current = child
                .execute(current, &child_ctx)
                .instrument(span)
                .await
                .map_err(|e| e.into_child(child_meta.primitive_type.clone()))?;

            prev_type = Some(child_meta.primitive_type);
        }

        Ok(current)
    }

    fn meta(&self) -> PrimitiveMeta {
        PrimitiveMeta::new("sequential")
    }
}
