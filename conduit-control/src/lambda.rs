//! `Lambda` — wraps a plain asynchronous callable as a primitive.

use async_trait::async_trait;
use conduit_core::{Primitive, PrimitiveMeta, WorkflowContext, WorkflowError};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A boxed async callable: `(input, context) -> Result<output, error>`.
type LambdaFn = Box<dyn Fn(Value, WorkflowContext) -> BoxFuture<'static, Result<Value, WorkflowError>> + Send + Sync>;

/// Adapts a plain asynchronous callable so it participates in composition,
/// instrumentation, and context propagation exactly like any other
/// primitive.
///
/// Mirrors the closure-to-trait-object adapter pattern used throughout the
/// corpus (e.g. a tool middleware built `from_fn`): the caller supplies a
/// closure returning a pinned boxed future, and `Lambda` wraps it behind
/// the object-safe [`Primitive`] trait.
///
/// # Examples
///
/// ```
/// use conduit_control::Lambda;
/// use conduit_core::{Primitive, WorkflowContext};
///
/// # async fn run() {
/// let add_one = Lambda::new("add_one", |input, _ctx| async move {
///     let n = input.as_i64().unwrap_or(0);
///     Ok(serde_json::json!(n + 1))
/// });
///
/// let ctx = WorkflowContext::new("wf-1");
/// let out = add_one.execute(serde_json::json!(3), &ctx).await.unwrap();
/// assert_eq!(out, serde_json::json!(4));
/// # }
/// ```
pub struct Lambda {
    name: String,
    f: LambdaFn,
}

impl Lambda {
    /// Wrap `f` as a primitive named `name` (used as its `primitive_type`).
    pub fn new<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value, WorkflowContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, WorkflowError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            f: Box::new(move |input, ctx| Box::pin(f(input, ctx))),
        }
    }
}

#[async_trait]
impl Primitive for Lambda {
    async fn execute(&self, input: Value, context: &WorkflowContext) -> Result<Value, WorkflowError> {
        (self.f)(input, context.clone()).await
    }

    fn meta(&self) -> PrimitiveMeta {
        PrimitiveMeta::new(self.name.clone())
    }
}
