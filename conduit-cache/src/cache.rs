//! `Cache` — bounded LRU+TTL cache with single-flight de-duplication.

use crate::key::{canonical_key, hashed_for_span, KeyFn};
use async_trait::async_trait;
use conduit_core::{DurationMs, Primitive, PrimitiveMeta, WorkflowContext, WorkflowError};
use conduit_otel::Telemetry;
use lru::LruCache;
use serde_json::Value;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::Instrument as _;

/// The `cache_type` label value this primitive reports on `cache.hits`
/// and `cache.total`.
const CACHE_TYPE: &str = "lru";

/// One live entry: the stored value, when it was written, and when it
/// expires. `size_hint` is a coarse byte estimate of the serialized value,
/// carried for callers that want to reason about memory budget; eviction
/// itself is driven purely by entry count (spec.md §4.4), not by this
/// hint.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    #[allow(dead_code)]
    stored_at: Instant,
    expires_at: Instant,
    #[allow(dead_code)]
    size_hint: usize,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// The outcome of one single-flight computation, shared (via a cloned
/// value or a reconstructed error) across every caller coalesced onto the
/// same in-flight attempt.
#[derive(Debug, Clone)]
enum Outcome {
    Value(Value),
    Failed(WorkflowError),
}

/// Wraps a child primitive with a bounded LRU+TTL cache keyed off the
/// input (spec.md §4.4).
///
/// Concurrent misses on the same key are coalesced: the first caller to
/// observe a miss runs the child; every other caller that misses on the
/// same key while that computation is in flight awaits its result instead
/// of re-invoking the child (the `n` concurrent callers / 1 child
/// invocation property from spec.md §8).
pub struct Cache {
    child: Arc<dyn Primitive>,
    name: String,
    ttl: DurationMs,
    store: Mutex<LruCache<String, CacheEntry>>,
    key_fn: Option<KeyFn>,
    in_flight: Mutex<HashMap<String, Arc<OnceCell<Outcome>>>>,
    telemetry: Option<Telemetry>,
}

impl Cache {
    /// Build a `Cache` wrapping `child`, holding at most `max_entries`
    /// live entries for up to `ttl_seconds` each, keyed by the canonical
    /// JSON serialization of the input.
    #[must_use]
    pub fn new(child: Arc<dyn Primitive>, ttl_seconds: u64, max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            child,
            name: "cache".to_string(),
            ttl: DurationMs::from_secs(ttl_seconds),
            store: Mutex::new(LruCache::new(capacity)),
            key_fn: None,
            in_flight: Mutex::new(HashMap::new()),
            telemetry: None,
        }
    }

    /// Override the `primitive_name` label this cache reports on its
    /// `cache.hits`/`cache.total` instruments. Defaults to `"cache"`.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Override key derivation. Receives only the input (spec.md §9 Open
    /// Questions: the source's default, which this spec follows).
    #[must_use]
    pub fn with_key_fn(mut self, key_fn: impl Fn(&Value) -> String + Send + Sync + 'static) -> Self {
        self.key_fn = Some(Box::new(key_fn));
        self
    }

    /// Record cache hit/total metrics against `telemetry`.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    fn key_for(&self, input: &Value) -> String {
        match &self.key_fn {
            Some(f) => f(input),
            None => canonical_key(input),
        }
    }

    /// Look up `key`, evicting it first if it has expired. Returns the
    /// live value on a hit.
    fn lookup(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut store = self.store.lock().expect("cache store mutex poisoned");
        match store.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                store.pop(key);
                None
            }
            None => None,
        }
    }

    /// Insert a freshly computed value, evicting the least-recently-used
    /// entry if this insertion would exceed `max_entries`.
    fn store_value(&self, key: String, value: Value) {
        let now = Instant::now();
        let size_hint = serde_json::to_string(&value).map(|s| s.len()).unwrap_or(0);
        let entry = CacheEntry {
            value,
            stored_at: now,
            expires_at: now + self.ttl.to_std(),
            size_hint,
        };
        self.store.lock().expect("cache store mutex poisoned").put(key, entry);
    }

    async fn compute(&self, key: String, input: Value, context: &WorkflowContext) -> Result<Value, WorkflowError> {
        let (cell, is_leader) = {
            let mut in_flight = self.in_flight.lock().expect("in-flight mutex poisoned");
            if let Some(existing) = in_flight.get(&key) {
                (Arc::clone(existing), false)
            } else {
                let cell = Arc::new(OnceCell::new());
                in_flight.insert(key.clone(), Arc::clone(&cell));
                (cell, true)
            }
        };

        let child_ctx = context.child("cache-miss");
        let outcome = cell
            .get_or_init(|| async {
                match self.child.execute(input, &child_ctx).await {
                    Ok(value) => Outcome::Value(value),
                    Err(e) => Outcome::Failed(e.to_shared()),
                }
            })
            .await
            .clone();

        if is_leader {
            self.in_flight.lock().expect("in-flight mutex poisoned").remove(&key);
            if let Outcome::Value(value) = &outcome {
                self.store_value(key, value.clone());
            }
        }

        match outcome {
            Outcome::Value(value) => Ok(value),
            Outcome::Failed(e) => Err(e),
        }
    }
}

#[async_trait]
impl Primitive for Cache {
    async fn execute(&self, input: Value, context: &WorkflowContext) -> Result<Value, WorkflowError> {
        let key = self.key_for(&input);
        let ttl_seconds = self.ttl.to_std().as_secs();

        if let Some(value) = self.lookup(&key) {
            let span = tracing::info_span!(
                "primitive.cache.execute",
                otel.name = %self.meta().span_name(),
                cache.hit = true,
                cache.key = %hashed_for_span(&key),
                cache.ttl_seconds = ttl_seconds,
            );
            let _entered = span.enter();
            if let Some(telemetry) = &self.telemetry {
                telemetry.record_cache_lookup(&self.name, CACHE_TYPE, true);
            }
            return Ok(value);
        }

        if let Some(telemetry) = &self.telemetry {
            telemetry.record_cache_lookup(&self.name, CACHE_TYPE, false);
        }

        // The compute future is instrumented (rather than entered across
        // this `.await`) because a held `Entered` guard is `!Send`, which
        // would make this boxed `async-trait` future non-`Send`.
        let lookup_span = tracing::info_span!(
            "primitive.cache.lookup",
            otel.name = %self.meta().step_span("lookup"),
            cache.hit = false,
            cache.key = %hashed_for_span(&key),
            cache.ttl_seconds = ttl_seconds,
        );
        self.compute(key, input, context)
            .instrument(lookup_span)
            .await
            .map_err(|e| e.into_child(self.child.meta().primitive_type))
    }

    fn meta(&self) -> PrimitiveMeta {
        PrimitiveMeta::new("cache").with_name(self.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::test_utils::Echo;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSlowEcho {
        calls: Arc<AtomicUsize>,
        sleep_ms: u64,
    }

    #[async_trait]
    impl Primitive for CountingSlowEcho {
        async fn execute(&self, input: Value, _context: &WorkflowContext) -> Result<Value, WorkflowError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(self.sleep_ms)).await;
            Ok(input)
        }

        fn meta(&self) -> PrimitiveMeta {
            PrimitiveMeta::new("counting_slow_echo")
        }
    }

    struct AlwaysFails {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Primitive for AlwaysFails {
        async fn execute(&self, _input: Value, _context: &WorkflowContext) -> Result<Value, WorkflowError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(WorkflowError::Cancelled)
        }

        fn meta(&self) -> PrimitiveMeta {
            PrimitiveMeta::new("always_fails")
        }
    }

    #[tokio::test]
    async fn miss_then_hit_invokes_child_once() {
        let telemetry = Telemetry::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let child = Arc::new(CountingSlowEcho { calls: Arc::clone(&calls), sleep_ms: 0 });
        let cache = Cache::new(child, 60, 10).with_telemetry(telemetry.clone());
        let ctx = WorkflowContext::new("wf-1");

        let first = cache.execute(serde_json::json!({"q": "hello"}), &ctx).await.unwrap();
        let second = cache.execute(serde_json::json!({"q": "hello"}), &ctx).await.unwrap();

        assert_eq!(first, serde_json::json!({"q": "hello"}));
        assert_eq!(second, first);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(telemetry.cache_total.with_label_values(&["cache", "lru"]).get(), 2.0);
        assert_eq!(telemetry.cache_hits.with_label_values(&["cache", "lru"]).get(), 1.0);
    }

    #[tokio::test]
    async fn distinct_keys_both_invoke_the_child() {
        let calls = Arc::new(AtomicUsize::new(0));
        let child = Arc::new(CountingSlowEcho { calls: Arc::clone(&calls), sleep_ms: 0 });
        let cache = Cache::new(child, 60, 10);
        let ctx = WorkflowContext::new("wf-1");

        cache.execute(serde_json::json!({"q": "a"}), &ctx).await.unwrap();
        cache.execute(serde_json::json!({"q": "b"}), &ctx).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_treated_as_a_miss() {
        let calls = Arc::new(AtomicUsize::new(0));
        let child = Arc::new(CountingSlowEcho { calls: Arc::clone(&calls), sleep_ms: 0 });
        let cache = Cache::new(child, 1, 10);
        let ctx = WorkflowContext::new("wf-1");

        cache.execute(serde_json::json!("k"), &ctx).await.unwrap();
        tokio::time::advance(std::time::Duration::from_secs(2)).await;
        cache.execute(serde_json::json!("k"), &ctx).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn max_entries_one_discards_the_previous_entry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let child = Arc::new(CountingSlowEcho { calls: Arc::clone(&calls), sleep_ms: 0 });
        let cache = Cache::new(child, 60, 1);
        let ctx = WorkflowContext::new("wf-1");

        cache.execute(serde_json::json!("a"), &ctx).await.unwrap();
        cache.execute(serde_json::json!("b"), &ctx).await.unwrap();
        // "a" was evicted when "b" was inserted; hitting it again re-invokes the child.
        cache.execute(serde_json::json!("a"), &ctx).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn concurrent_misses_on_the_same_key_invoke_the_child_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let child = Arc::new(CountingSlowEcho { calls: Arc::clone(&calls), sleep_ms: 20 });
        let cache = Arc::new(Cache::new(child, 60, 10));
        let ctx = WorkflowContext::new("wf-1");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                cache.execute(serde_json::json!("shared-key"), &ctx).await
            }));
        }

        for handle in handles {
            let out = handle.await.unwrap().unwrap();
            assert_eq!(out, serde_json::json!("shared-key"));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_failing_child_is_never_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let child = Arc::new(AlwaysFails { calls: Arc::clone(&calls) });
        let cache = Cache::new(child, 60, 10);
        let ctx = WorkflowContext::new("wf-1");

        let _ = cache.execute(serde_json::json!("k"), &ctx).await;
        let _ = cache.execute(serde_json::json!("k"), &ctx).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn custom_key_fn_overrides_canonical_serialization() {
        let calls = Arc::new(AtomicUsize::new(0));
        let child = Arc::new(CountingSlowEcho { calls: Arc::clone(&calls), sleep_ms: 0 });
        let cache = Cache::new(child, 60, 10).with_key_fn(|input| {
            input.get("id").and_then(Value::as_str).unwrap_or("?").to_string()
        });
        let ctx = WorkflowContext::new("wf-1");

        cache.execute(serde_json::json!({"id": "x", "noise": 1}), &ctx).await.unwrap();
        cache.execute(serde_json::json!({"id": "x", "noise": 2}), &ctx).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn degenerate_passthrough_matches_the_unwrapped_child() {
        let cache = Cache::new(Arc::new(Echo), 60, 10);
        let ctx = WorkflowContext::new("wf-1");
        let direct = Echo.execute(serde_json::json!(42), &ctx).await.unwrap();
        let via_cache = cache.execute(serde_json::json!(42), &ctx).await.unwrap();
        assert_eq!(direct, via_cache);
    }
}
