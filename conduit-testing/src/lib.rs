//! `Mock` — a deterministic test double implementing [`conduit_core::Primitive`].
//!
//! Mirrors the corpus's own test-double pattern (a `LoggingHook` that
//! records every event it sees, an `EchoOperator` that returns its input
//! unchanged) generalized to a primitive that can either echo a fixed
//! response or run a caller-supplied side-effect coroutine, and that
//! always remembers every call it served.

#![deny(missing_docs)]

use async_trait::async_trait;
use conduit_core::{Primitive, PrimitiveMeta, WorkflowContext, WorkflowError};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
type SideEffect = Box<dyn Fn(Value, WorkflowContext) -> BoxFuture<'static, Result<Value, WorkflowError>> + Send + Sync>;

/// What a `Mock` does when called: return a fixed value, fail with a fixed
/// error, or delegate to a caller-supplied coroutine.
enum Behavior {
    Return(Value),
    Fail(WorkflowError),
    SideEffect(SideEffect),
}

/// One recorded invocation of a [`Mock`].
#[derive(Debug, Clone)]
pub struct MockCall {
    /// Monotonically increasing index, starting at 0, assigned in call order.
    pub index: usize,
    /// The input this call received.
    pub input: Value,
    /// The `workflow_id` of the context this call received — an identity
    /// snapshot rather than a clone of the whole context, since
    /// `WorkflowContext` carries a shared, mutable `state` that would make
    /// a cloned snapshot misleading after the fact.
    pub workflow_id: String,
    /// The context's `parent_span_reference` at call time, if any.
    pub parent_span_reference: Option<String>,
}

/// A deterministic test double: records every invocation (input, calling
/// context identity, and a call index) and either returns a scripted
/// response or runs a side-effect coroutine.
///
/// # Examples
///
/// ```
/// use conduit_core::{Primitive, WorkflowContext};
/// use conduit_testing::Mock;
///
/// # async fn run() {
/// let mock = Mock::returning("greeter", serde_json::json!({"ok": true}));
/// let ctx = WorkflowContext::new("wf-1");
///
/// let out = mock.execute(serde_json::json!({"q": "hi"}), &ctx).await.unwrap();
/// assert_eq!(out, serde_json::json!({"ok": true}));
/// assert_eq!(mock.call_count(), 1);
/// assert_eq!(mock.calls()[0].input, serde_json::json!({"q": "hi"}));
/// # }
/// ```
pub struct Mock {
    name: String,
    behavior: Behavior,
    calls: Mutex<Vec<MockCall>>,
}

impl Mock {
    /// Build a `Mock` that always returns `value`.
    #[must_use]
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            behavior: Behavior::Return(value),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Build a `Mock` that always fails with `error`.
    #[must_use]
    pub fn failing(name: impl Into<String>, error: WorkflowError) -> Self {
        Self {
            name: name.into(),
            behavior: Behavior::Fail(error),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Build a `Mock` that runs `f` on every call, recording the
    /// invocation before delegating. `f` may itself be stateful (e.g.
    /// a closure over an `AtomicUsize` or a scripted response queue) to
    /// model a child that fails on the first N attempts and succeeds
    /// afterward.
    pub fn with_side_effect<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value, WorkflowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, WorkflowError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            behavior: Behavior::SideEffect(Box::new(move |input, ctx| Box::pin(f(input, ctx)))),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The number of calls served so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("mock call log mutex poisoned").len()
    }

    /// A snapshot of every call served so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().expect("mock call log mutex poisoned").clone()
    }

    /// The input of the most recent call, if any have been served.
    #[must_use]
    pub fn last_input(&self) -> Option<Value> {
        self.calls.lock().expect("mock call log mutex poisoned").last().map(|c| c.input.clone())
    }

    fn record(&self, input: Value, context: &WorkflowContext) {
        let mut calls = self.calls.lock().expect("mock call log mutex poisoned");
        let index = calls.len();
        calls.push(MockCall {
            index,
            input,
            workflow_id: context.workflow_id.to_string(),
            parent_span_reference: context.parent_span_reference.clone(),
        });
    }
}

#[async_trait]
impl Primitive for Mock {
    async fn execute(&self, input: Value, context: &WorkflowContext) -> Result<Value, WorkflowError> {
        self.record(input.clone(), context);
        match &self.behavior {
            Behavior::Return(value) => Ok(value.clone()),
            Behavior::Fail(error) => Err(error.to_shared()),
            Behavior::SideEffect(f) => f(input, context.clone()).await,
        }
    }

    fn meta(&self) -> PrimitiveMeta {
        PrimitiveMeta::new(self.name.clone())
    }
}
