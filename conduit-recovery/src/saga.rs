//! `Saga` — compensation-based rollback over an ordered list of forward
//! steps.

use async_trait::async_trait;
use conduit_core::{Primitive, PrimitiveMeta, SagaRollbackStatus, WorkflowContext, WorkflowError};
use serde_json::Value;
use std::sync::Arc;
use tracing::Instrument as _;

/// A forward step paired with its compensating inverse. The compensation
/// receives the forward step's successful output as its input, and is
/// expected to be idempotent (spec.md §4.3).
pub struct SagaStep {
    /// The step to run moving forward.
    pub forward: Arc<dyn Primitive>,
    /// Undoes `forward`'s effect, invoked only during rollback.
    pub compensation: Arc<dyn Primitive>,
}

impl SagaStep {
    /// Pair a forward step with its compensation.
    #[must_use]
    pub fn new(forward: Arc<dyn Primitive>, compensation: Arc<dyn Primitive>) -> Self {
        Self { forward, compensation }
    }
}

/// Lifecycle state of one `Saga` execution (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaState {
    /// Forward steps are still being attempted.
    Running,
    /// Every forward step succeeded; no rollback occurred.
    Completed,
    /// A forward step failed and every pushed compensation ran
    /// successfully.
    RolledBack,
    /// A forward step failed and at least one compensation itself failed;
    /// rollback continued regardless.
    PartialRollback,
}

/// Runs an ordered list of `(forward, compensation)` pairs. On the first
/// failing forward step, every compensation pushed so far is popped and
/// run in reverse order, then the original forward-step failure is
/// re-raised wrapped in [`WorkflowError::SagaRollback`] — never a
/// compensation's own failure.
pub struct Saga {
    steps: Vec<SagaStep>,
}

impl Saga {
    /// Build a `Saga` over `steps`, run in order.
    #[must_use]
    pub fn new(steps: Vec<SagaStep>) -> Self {
        Self { steps }
    }
}

#[async_trait]
impl Primitive for Saga {
    async fn execute(&self, input: Value, context: &WorkflowContext) -> Result<Value, WorkflowError> {
        let mut compensation_stack: Vec<(usize, Value)> = Vec::new();
        let mut current = input;

        for (index, step) in self.steps.iter().enumerate() {
            let child_ctx = context.child(format!("saga-forward-{index}"));
            let span = tracing::info_span!("primitive.saga.forward_step", step.index = index);

            match step.forward.execute(current.clone(), &child_ctx).instrument(span).await {
                Ok(output) => {
                    compensation_stack.push((index, output.clone()));
                    current = output;
                }
                Err(forward_err) => {
                    let mut partial = false;
                    while let Some((comp_index, comp_input)) = compensation_stack.pop() {
                        let comp_ctx = context.child(format!("saga-compensate-{comp_index}"));
                        let comp_span = tracing::info_span!("primitive.saga.compensate", step.index = comp_index);
                        if let Err(comp_err) = self.steps[comp_index]
                            .compensation
                            .execute(comp_input, &comp_ctx)
                            .instrument(comp_span)
                            .await
                        {
                            partial = true;
                            tracing::error!(
                                step.index = comp_index,
                                saga.partial_rollback = true,
                                "compensation for step {comp_index} failed: {comp_err}"
                            );
                        }
                    }
                    let (state, rollback) = if partial {
                        (SagaState::PartialRollback, SagaRollbackStatus::Partial)
                    } else {
                        (SagaState::RolledBack, SagaRollbackStatus::Complete)
                    };
                    tracing::debug!(saga.state = ?state, "saga rolled back at step {index}");
                    return Err(WorkflowError::SagaRollback {
                        rollback,
                        source: Box::new(forward_err.into_child(step.forward.meta().primitive_type)),
                    });
                }
            }
        }

        tracing::debug!(saga.state = ?SagaState::Completed, "saga completed");
        Ok(current)
    }

    fn meta(&self) -> PrimitiveMeta {
        PrimitiveMeta::new("saga")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::test_utils::Echo;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FailingForward;

    #[async_trait]
    impl Primitive for FailingForward {
        async fn execute(&self, _input: Value, _context: &WorkflowContext) -> Result<Value, WorkflowError> {
            Err(WorkflowError::Validation("forward failed".into()))
        }
        fn meta(&self) -> PrimitiveMeta {
            PrimitiveMeta::new("failing_forward")
        }
    }

    struct RecordingCompensation {
        order: Arc<Mutex<Vec<usize>>>,
        index: usize,
        fails: bool,
    }

    #[async_trait]
    impl Primitive for RecordingCompensation {
        async fn execute(&self, input: Value, _context: &WorkflowContext) -> Result<Value, WorkflowError> {
            self.order.lock().unwrap().push(self.index);
            if self.fails {
                return Err(WorkflowError::Validation("compensation failed".into()));
            }
            Ok(input)
        }
        fn meta(&self) -> PrimitiveMeta {
            PrimitiveMeta::new("recording_compensation")
        }
    }

    #[tokio::test]
    async fn all_forward_steps_succeed_invokes_zero_compensations() {
        let calls = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        let steps = vec![
            SagaStep::new(Arc::new(Echo), Arc::new(RecordingCompensation { order: order.clone(), index: 0, fails: false })),
            SagaStep::new(Arc::new(Echo), Arc::new(RecordingCompensation { order: order.clone(), index: 1, fails: false })),
        ];
        let saga = Saga::new(steps);
        let ctx = WorkflowContext::new("wf-1");

        let out = saga.execute(serde_json::json!(1), &ctx).await.unwrap();
        assert_eq!(out, serde_json::json!(1));
        assert!(order.lock().unwrap().is_empty());
        let _ = calls;
    }

    #[tokio::test]
    async fn third_step_failure_rolls_back_in_reverse_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let steps = vec![
            SagaStep::new(Arc::new(Echo), Arc::new(RecordingCompensation { order: order.clone(), index: 0, fails: false })),
            SagaStep::new(Arc::new(Echo), Arc::new(RecordingCompensation { order: order.clone(), index: 1, fails: false })),
            SagaStep::new(Arc::new(FailingForward), Arc::new(RecordingCompensation { order: order.clone(), index: 2, fails: false })),
        ];
        let saga = Saga::new(steps);
        let ctx = WorkflowContext::new("wf-1");

        let err = saga.execute(serde_json::json!(1), &ctx).await.unwrap_err();
        assert_eq!(err.error_type(), "saga_rollback_error");
        assert!(!err.is_recoverable());
        assert_eq!(*order.lock().unwrap(), vec![1, 0]);
    }

    #[tokio::test]
    async fn compensation_failure_marks_partial_and_continues() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let steps = vec![
            SagaStep::new(Arc::new(Echo), Arc::new(RecordingCompensation { order: order.clone(), index: 0, fails: false })),
            SagaStep::new(Arc::new(Echo), Arc::new(RecordingCompensation { order: order.clone(), index: 1, fails: true })),
            SagaStep::new(Arc::new(FailingForward), Arc::new(RecordingCompensation { order: order.clone(), index: 2, fails: false })),
        ];
        let saga = Saga::new(steps);
        let ctx = WorkflowContext::new("wf-1");

        let err = saga.execute(serde_json::json!(1), &ctx).await.unwrap_err();
        match &err {
            WorkflowError::SagaRollback { rollback, source } => {
                assert_eq!(*rollback, SagaRollbackStatus::Partial);
                assert_eq!(source.error_type(), "child_error");
            }
            _ => panic!("expected SagaRollback"),
        }
        // Step 0's compensation still ran despite step 1's compensation failing.
        assert_eq!(*order.lock().unwrap(), vec![1, 0]);
    }
}
