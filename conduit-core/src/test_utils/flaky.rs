//! FlakyPrimitive — fails with a recoverable error on its first `n`
//! invocations, then succeeds.

use crate::context::WorkflowContext;
use crate::error::WorkflowError;
use crate::primitive::{Primitive, PrimitiveMeta};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A primitive that raises `cancelled_error` (recoverable) on its first
/// `fail_times` invocations and returns `input` unchanged afterward.
/// Used to test retry/backoff and fallback behavior deterministically.
pub struct FlakyPrimitive {
    fail_times: usize,
    attempts: AtomicUsize,
}

impl FlakyPrimitive {
    /// Build a `FlakyPrimitive` that fails on its first `fail_times` calls.
    #[must_use]
    pub fn new(fail_times: usize) -> Self {
        Self {
            fail_times,
            attempts: AtomicUsize::new(0),
        }
    }

    /// Number of times `execute` has been called so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Primitive for FlakyPrimitive {
    async fn execute(
        &self,
        input: serde_json::Value,
        _context: &WorkflowContext,
    ) -> Result<serde_json::Value, WorkflowError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_times {
            return Err(WorkflowError::Cancelled);
        }
        Ok(input)
    }

    fn meta(&self) -> PrimitiveMeta {
        PrimitiveMeta::new("flaky")
    }
}
