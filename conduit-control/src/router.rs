//! `Router` — generalizes `Conditional` to an open-ended set of routes.

use async_trait::async_trait;
use conduit_core::{Connection, ConnectionType, Primitive, PrimitiveMeta, WorkflowContext, WorkflowError};
use conduit_otel::Telemetry;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::Instrument as _;

/// A synchronous selector computing a route key from the input.
pub type Selector = Box<dyn Fn(&Value, &WorkflowContext) -> String + Send + Sync>;

/// Dispatches the input to exactly one child, chosen by a runtime-computed
/// route key.
///
/// A map from string key to primitive handle is used rather than a closed
/// tagged-variant dispatch, per spec.md §9's guidance for an open-ended key
/// space (callers can register routes after construction isn't supported —
/// the set is fixed at build time via [`Router::new`], but the key space
/// itself isn't a compile-time enum).
pub struct Router {
    select: Selector,
    routes: HashMap<String, Arc<dyn Primitive>>,
    default: Option<Arc<dyn Primitive>>,
    telemetry: Option<Telemetry>,
}

impl Router {
    /// Build a router dispatching via `select` over `routes`. Unknown keys
    /// fail with [`WorkflowError::Routing`] unless [`Router::with_default`]
    /// configures a fallback child.
    pub fn new(
        select: impl Fn(&Value, &WorkflowContext) -> String + Send + Sync + 'static,
        routes: HashMap<String, Arc<dyn Primitive>>,
    ) -> Self {
        Self {
            select: Box::new(select),
            routes,
            default: None,
            telemetry: None,
        }
    }

    /// Configure a child to handle keys absent from the routing table.
    #[must_use]
    pub fn with_default(mut self, default: Arc<dyn Primitive>) -> Self {
        self.default = Some(default);
        self
    }

    /// Record a connection edge against `telemetry` on every match.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }
}

#[async_trait]
impl Primitive for Router {
    async fn execute(&self, input: Value, context: &WorkflowContext) -> Result<Value, WorkflowError> {
        let key = (self.select)(&input, context);

        let (matched, child) = match self.routes.get(&key) {
            Some(child) => (true, child),
            None => match &self.default {
                Some(default) => (false, default),
                None => {
                    tracing::warn!(routing.key = %key, routing.matched = false, "no route for key");
                    return Err(WorkflowError::Routing(key));
                }
            },
        };

        let span = tracing::info_span!(
            "primitive.router.execute",
            routing.key = %key,
            routing.matched = matched,
        );

        if let Some(telemetry) = &self.telemetry {
            telemetry.record_connection(&Connection::new(
                self.meta().primitive_type,
                child.meta().primitive_type.clone(),
                ConnectionType::Router,
            ));
        }

        let child_ctx = context.child(format!("router-{key}"));
        child
            .execute(input, &child_ctx)
            .instrument(span)
            .await
            .map_err(|e| e.into_child(child.meta().primitive_type))
    }

    fn meta(&self) -> PrimitiveMeta {
        PrimitiveMeta::new("router")
    }
}
