//! FailingPrimitive — always raises a configured error.

use crate::context::WorkflowContext;
use crate::error::WorkflowError;
use crate::primitive::{Primitive, PrimitiveMeta};
use async_trait::async_trait;

/// A primitive that always fails with a `validation_error` carrying the
/// given message.
pub struct FailingPrimitive {
    message: String,
}

impl FailingPrimitive {
    /// Build a `FailingPrimitive` that always raises `message`.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[async_trait]
impl Primitive for FailingPrimitive {
    async fn execute(
        &self,
        _input: serde_json::Value,
        _context: &WorkflowContext,
    ) -> Result<serde_json::Value, WorkflowError> {
        Err(WorkflowError::Validation(self.message.clone()))
    }

    fn meta(&self) -> PrimitiveMeta {
        PrimitiveMeta::new("failing")
    }
}
