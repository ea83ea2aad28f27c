#![deny(missing_docs)]
//! # conduit — umbrella crate
//!
//! A single import surface for the conduit workflow-primitive workspace.
//! Re-exports every crate behind a Cargo feature, plus a `prelude` for the
//! happy path of composing primitives.
//!
//! ```
//! use conduit::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let add_one = Lambda::new("add_one", |input, _ctx| async move {
//!     Ok(serde_json::json!(input.as_i64().unwrap_or(0) + 1))
//! });
//! let chain = Sequential::new(vec![Arc::new(add_one)]);
//!
//! let ctx = WorkflowContext::new("wf-1");
//! let out = chain.execute(serde_json::json!(41), &ctx).await?;
//! assert_eq!(out, serde_json::json!(42));
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "cache")]
pub use conduit_cache;
#[cfg(feature = "compose")]
pub use conduit_compose;
#[cfg(feature = "control")]
pub use conduit_control;
#[cfg(feature = "core")]
pub use conduit_core;
#[cfg(feature = "otel")]
pub use conduit_otel;
#[cfg(feature = "recovery")]
pub use conduit_recovery;
#[cfg(feature = "testing")]
pub use conduit_testing;

/// Happy-path imports for composing conduit workflows.
pub mod prelude {
    #[cfg(feature = "core")]
    pub use conduit_core::{
        Connection, ConnectionType, CorrelationId, Primitive, PrimitiveMeta, SessionId,
        WorkflowContext, WorkflowError, WorkflowId,
    };

    #[cfg(feature = "compose")]
    pub use conduit_compose::{Parallel, Sequential};

    #[cfg(feature = "control")]
    pub use conduit_control::{Conditional, Lambda, Router};

    #[cfg(feature = "recovery")]
    pub use conduit_recovery::{
        BackoffStrategy, CircuitBreaker, CircuitState, Fallback, OnTimeout, Retry, Saga,
        SagaState, SagaStep, Timeout,
    };

    #[cfg(feature = "cache")]
    pub use conduit_cache::Cache;

    #[cfg(feature = "otel")]
    pub use conduit_otel::{Instrumented, Telemetry};

    #[cfg(feature = "testing")]
    pub use conduit_testing::Mock;
}
