//! `Conditional` — a synchronous predicate picks exactly one of two
//! branches.

use async_trait::async_trait;
use conduit_core::{Primitive, PrimitiveMeta, WorkflowContext, WorkflowError};
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument as _;

/// A synchronous predicate deciding which branch of a [`Conditional`]
/// runs.
pub type Predicate = Box<dyn Fn(&Value, &WorkflowContext) -> bool + Send + Sync>;

/// Runs exactly one of `then_primitive` or `else_primitive`, chosen by a
/// synchronous `predicate(input, context) -> bool`.
///
/// No connection edge is emitted to the branch not taken — only the taken
/// branch is ever invoked, so there is nothing to record an edge to.
pub struct Conditional {
    predicate: Predicate,
    then_primitive: Arc<dyn Primitive>,
    else_primitive: Arc<dyn Primitive>,
}

impl Conditional {
    /// Build a `Conditional` from a predicate and its two branches.
    pub fn new(
        predicate: impl Fn(&Value, &WorkflowContext) -> bool + Send + Sync + 'static,
        then_primitive: Arc<dyn Primitive>,
        else_primitive: Arc<dyn Primitive>,
    ) -> Self {
        Self {
            predicate: Box::new(predicate),
            then_primitive,
            else_primitive,
        }
    }
}

#[async_trait]
impl Primitive for Conditional {
    async fn execute(&self, input: Value, context: &WorkflowContext) -> Result<Value, WorkflowError> {
        let taken = (self.predicate)(&input, context);
        let (branch_name, branch) = if taken {
            ("then", &self.then_primitive)
        } else {
            ("else", &self.else_primitive)
        };

        let span = tracing::info_span!(
            "primitive.conditional.execute",
            conditional.branch_taken = branch_name,
        );

        let child_ctx = context.child(format!("conditional-{branch_name}"));
        branch
            .execute(input, &child_ctx)
            .instrument(span)
            .await
            .map_err(|e| e.into_child(branch.meta().primitive_type))
    }

    fn meta(&self) -> PrimitiveMeta {
        PrimitiveMeta::new("conditional")
    }
}
