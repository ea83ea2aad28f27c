//! The `Primitive` contract — the single abstraction every composable unit
//! in a workflow implements.

use crate::context::WorkflowContext;
use crate::error::WorkflowError;
use async_trait::async_trait;
use serde_json::Value;

/// Identity attributes carried by every primitive, independent of its
/// configuration.
///
/// The pair `(primitive_type, action)` determines the span name
/// `primitive.{primitive_type}.{action}` and, together with `name`, labels
/// every one of the seven metric instruments (see `conduit-otel`). `action`
/// is usually `execute`; recovery primitives open additional step spans
/// with actions like `attempt_0` or `step_1` without changing their own
/// `PrimitiveMeta`.
///
/// `primitive_type` is the semantic class (`sequential`, `retry`, `cache`,
/// ...) and `name` is the class-level identity spec.md §3 asks spans and
/// the `primitive_name` metric label to carry — distinct from the type so
/// that, e.g., two differently-configured `Cache` nodes in the same
/// workflow can be told apart on a dashboard even though both report
/// `primitive_type = "cache"`. Most primitives have no natural per-instance
/// identity beyond their class, so [`PrimitiveMeta::new`] and
/// [`PrimitiveMeta::with_action`] default `name` to `primitive_type`;
/// [`PrimitiveMeta::with_name`] overrides it for primitives — `Lambda`,
/// `Conditional`, `Router`'s routes, `Cache::with_name` — that do have one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrimitiveMeta {
    /// Semantic class of primitive, e.g. `sequential`, `retry`, `cache`.
    pub primitive_type: String,
    /// Class-level identity, e.g. a named `Cache` instance or a `Lambda`'s
    /// callable name. Defaults to `primitive_type` when a primitive has no
    /// distinct instance identity.
    pub name: String,
    /// The operation this span represents. Usually `execute`.
    pub action: String,
}

impl PrimitiveMeta {
    /// Build a `PrimitiveMeta` with the conventional `execute` action and
    /// `name` defaulted to `primitive_type`.
    pub fn new(primitive_type: impl Into<String>) -> Self {
        let primitive_type = primitive_type.into();
        Self {
            name: primitive_type.clone(),
            primitive_type,
            action: "execute".to_string(),
        }
    }

    /// Build a `PrimitiveMeta` with an explicit non-default action, for a
    /// primitive that wants its own top-level span named something other
    /// than `execute` (step spans use [`PrimitiveMeta::span_name`] directly
    /// instead, since they don't correspond to a whole primitive). `name`
    /// defaults to `primitive_type`.
    pub fn with_action(primitive_type: impl Into<String>, action: impl Into<String>) -> Self {
        let primitive_type = primitive_type.into();
        Self {
            name: primitive_type.clone(),
            primitive_type,
            action: action.into(),
        }
    }

    /// Override the class-level identity reported as `name`.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// The `primitive.{primitive_type}.{action}` span name this meta
    /// implies.
    #[must_use]
    pub fn span_name(&self) -> String {
        format!("primitive.{}.{}", self.primitive_type, self.action)
    }

    /// The span name for a sub-operation of this primitive, e.g.
    /// `step_span("attempt_0")` on a retry's `PrimitiveMeta` yields
    /// `primitive.retry.attempt_0`.
    #[must_use]
    pub fn step_span(&self, action: impl AsRef<str>) -> String {
        format!("primitive.{}.{}", self.primitive_type, action.as_ref())
    }
}

/// The abstract unit of work every concrete primitive (and every
/// composition of primitives) implements.
///
/// A `Primitive` exposes exactly one asynchronous entry point. Input and
/// output are both `serde_json::Value` — the kernel deliberately does not
/// parameterize `Primitive` over typed input/output, because spec.md's
/// compositions are heterogeneous (`Cache >> Retry >> Echo`, a `Router`
/// dispatching to differently-shaped handlers) and Rust's dyn-safety rules
/// would otherwise force every composition root to fix a single concrete
/// type anyway. Concrete primitives that want typed input should validate
/// and convert at their own boundary (see `conduit-control::Lambda` for the
/// typed-callable adapter).
///
/// Implementations must not read or write hidden global state; anything a
/// primitive depends on beyond `input` must arrive through `context` or
/// through values captured at construction time.
#[async_trait]
pub trait Primitive: Send + Sync {
    /// Execute this primitive against `input` and the given context.
    ///
    /// Implementations must treat `context` as logically immutable except
    /// through its shared `state` map, and must observe cooperative
    /// cancellation signals carried by the async runtime (a dropped/aborted
    /// task) without acquiring new resources once cancellation begins.
    async fn execute(&self, input: Value, context: &WorkflowContext) -> Result<Value, WorkflowError>;

    /// This primitive's identity attributes, used to name its span and
    /// label its metrics.
    fn meta(&self) -> PrimitiveMeta;
}

/// Blanket implementation so `Arc<dyn Primitive>` composes directly as a
/// primitive, letting composition operators hold children as
/// `Arc<dyn Primitive>` without an extra wrapper type.
#[async_trait]
impl Primitive for std::sync::Arc<dyn Primitive> {
    async fn execute(&self, input: Value, context: &WorkflowContext) -> Result<Value, WorkflowError> {
        self.as_ref().execute(input, context).await
    }

    fn meta(&self) -> PrimitiveMeta {
        self.as_ref().meta()
    }
}
