//! Echo — returns the input unchanged. Used for testing composition.

use crate::error::WorkflowError;
use crate::primitive::{Primitive, PrimitiveMeta};
use crate::context::WorkflowContext;
use async_trait::async_trait;

/// A primitive that returns its input as its output unchanged.
pub struct Echo;

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
