//! Bounded LRU+TTL cache primitive with single-flight de-duplication.
//!
//! [`Cache`] wraps any [`conduit_core::Primitive`] with a cache keyed off
//! its input. A miss runs the child and stores the result for `ttl_seconds`;
//! concurrent misses on the same key are coalesced so the child runs once
//! regardless of how many callers arrive while the computation is in
//! flight.

mod cache;
mod key;

pub use cache::Cache;
pub use key::KeyFn;
