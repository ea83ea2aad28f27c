//! Control-flow primitives (spec.md §4.2): the lambda adapter, conditional
//! branch, and dynamic router.
//!
//! These primitives decide *which* child runs, never *whether to retry* —
//! recovery behavior lives in `conduit-recovery`.

#![deny(missing_docs)]

mod conditional;
mod lambda;
mod router;

pub use conditional::Conditional;
pub use lambda::Lambda;
pub use router::Router;
