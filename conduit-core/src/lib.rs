//! # conduit-core — the primitive contract for composable workflows
//!
//! This crate defines the one protocol boundary every workflow primitive in
//! this ecosystem is built against: a single asynchronous `execute(input,
//! context) -> output` operation, plus the context value threaded through
//! every call and the error taxonomy primitives raise.
//!
//! ## Design Principle
//!
//! [`Primitive::execute`] means "run this unit of work" — not "call an LLM"
//! or "hit a cache." Concrete behavior (retrying, timing out, caching,
//! branching) lives in the crates built on top of this one
//! (`conduit-compose`, `conduit-control`, `conduit-recovery`,
//! `conduit-cache`); this crate only fixes the shape every one of them must
//! share so they can be composed, wrapped, and instrumented uniformly.
//!
//! ## Dependency Notes
//!
//! Like the trait it's modeled on, `Primitive` uses `async-trait`
//! (heap-allocated futures) rather than native `async fn in dyn Trait` —
//! compositions hold heterogeneous children behind `Arc<dyn Primitive<...>>`,
//! which requires trait objects today.

#![deny(missing_docs)]

pub mod connection;
pub mod context;
pub mod duration;
pub mod error;
pub mod id;
pub mod primitive;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use connection::{Connection, ConnectionType};
pub use context::WorkflowContext;
pub use duration::DurationMs;
pub use error::WorkflowError;
pub use id::{CorrelationId, SessionId, WorkflowId};
pub use primitive::{Primitive, PrimitiveMeta};
