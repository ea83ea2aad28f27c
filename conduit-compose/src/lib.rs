//! Sequential and parallel composition operators (spec.md §4.1).
//!
//! These are the two composition primitives every other primitive in the
//! ecosystem builds on: [`Sequential`] threads a child's output into the
//! next child's input with strict happens-before ordering; [`Parallel`]
//! dispatches the same input to every child concurrently via
//! `tokio::task::JoinSet`, fail-fast by default with an opt-in
//! collect-errors mode.

#![deny(missing_docs)]

mod parallel;
mod sequential;

pub use parallel::Parallel;
pub use sequential::Sequential;
