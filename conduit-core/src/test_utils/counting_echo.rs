//! CountingEcho — echoes the input and records how many times it ran.

use crate::context::WorkflowContext;
use crate::error::WorkflowError;
use crate::primitive::{Primitive, PrimitiveMeta};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// An `Echo` that increments a shared counter on every invocation, so
/// tests can assert a primitive was (or was not) reached.
pub struct CountingEcho {
    calls: Arc<AtomicUsize>,
}

impl CountingEcho {
    /// Build a `CountingEcho` that increments `calls` on every execution.
    #[must_use]
    pub fn new(calls: Arc<AtomicUsize>) -> Self {
        Self { calls }
    }
}

#[async_trait]
impl Primitive for CountingEcho {
    async fn execute(
        &self,
        input: serde_json::Value,
        _context: &WorkflowContext,
    ) -> Result<serde_json::Value, WorkflowError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(input)
    }

    fn meta(&self) -> PrimitiveMeta {
        PrimitiveMeta::new("counting_echo")
    }
}
