//! Instrumentation wrapper and the seven standardized metrics every
//! conduit primitive is measured by.
//!
//! [`Telemetry`] owns an explicit [`prometheus::Registry`] — there is no
//! process-global metrics registry anywhere in this crate. An application
//! constructs one `Telemetry` (or several — one per tenant, one per test)
//! and threads it into [`Instrumented::new`] alongside the primitive it
//! wraps.
//!
//! # Usage
//!
//! ```
//! use conduit_core::{Primitive, PrimitiveMeta, WorkflowContext, WorkflowError};
//! use conduit_otel::{Instrumented, Telemetry};
//! use async_trait::async_trait;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Primitive for Echo {
//!     async fn execute(&self, input: serde_json::Value, _ctx: &WorkflowContext) -> Result<serde_json::Value, WorkflowError> {
//!         Ok(input)
//!     }
//!     fn meta(&self) -> PrimitiveMeta {
//!         PrimitiveMeta::new("echo")
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let telemetry = Telemetry::new()?;
//! let echo = Instrumented::new(Echo, telemetry);
//! let ctx = WorkflowContext::new("wf-1");
//! let out = echo.execute(serde_json::json!({"q": "hello"}), &ctx).await?;
//! assert_eq!(out, serde_json::json!({"q": "hello"}));
//! # Ok(())
//! # }
//! ```
//!
//! Spans are emitted through [`tracing`]; bring your own
//! `tracing-opentelemetry` subscriber to export them. If no subscriber is
//! installed, span emission is a no-op. If no `Telemetry` is supplied
//! (see [`Instrumented::uninstrumented`]), metric recording is a no-op —
//! neither path changes a primitive's functional behavior.

#![deny(missing_docs)]

mod telemetry;
mod wrapper;

pub use telemetry::{Telemetry, DURATION_BUCKETS_MS};
pub use wrapper::Instrumented;
