//! Minimal `Primitive` implementations for testing composition operators
//! and recovery primitives against.
//!
//! Available behind the `test-utils` feature flag.

mod counting_echo;
mod echo;
mod failing;
mod flaky;

pub use counting_echo::CountingEcho;
pub use echo::Echo;
pub use failing::FailingPrimitive;
pub use flaky::FlakyPrimitive;
