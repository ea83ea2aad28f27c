//! The seven standardized metric instruments (spec.md §4.6), registered
//! against an explicit [`prometheus::Registry`].

use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Millisecond histogram buckets tuned for sub-second-to-10-second request
/// latencies.
pub const DURATION_BUCKETS_MS: &[f64] = &[
    1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
];

/// Default cap on distinct label combinations tracked per instrument
/// before further combinations are dropped (spec.md §3: "cap and drop
/// further labels rather than unbounded growth").
pub const DEFAULT_LABEL_CARDINALITY_CAP: usize = 1000;

/// Tracks distinct label combinations observed per instrument and refuses
/// new combinations past a configured cap, so a caller that (say) uses
/// unbounded cache keys or request ids as labels can't grow the instrument
/// without limit. Already-admitted combinations are always recorded;
/// every instrument logs one `tracing::warn!` the first time it hits the
/// cap.
struct CardinalityGuard {
    cap: usize,
    seen: Mutex<HashMap<&'static str, (HashSet<String>, bool)>>,
}

impl CardinalityGuard {
    fn new(cap: usize) -> Self {
        Self {
            cap,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if `labels` (already joined into one key) may be
    /// recorded against `instrument`, admitting it into the tracked set if
    /// this is the first time it's been seen.
    fn admit(&self, instrument: &'static str, label_key: &str) -> bool {
        let mut seen = self.seen.lock().expect("cardinality guard mutex poisoned");
        let (combos, warned) = seen.entry(instrument).or_insert_with(|| (HashSet::new(), false));
        if combos.contains(label_key) {
            return true;
        }
        if combos.len() >= self.cap {
            if !*warned {
                tracing::warn!(instrument, cap = self.cap, "label cardinality cap reached, dropping new combinations");
                *warned = true;
            }
            return false;
        }
        combos.insert(label_key.to_string());
        true
    }
}

/// An explicitly-constructed home for the seven metric instruments every
/// instrumented primitive writes to.
///
/// There is no process-global registry anywhere in this crate: an
/// application builds exactly one `Telemetry` (or several, one per tenant,
/// or one per test) and threads it into [`crate::Instrumented::new`]
/// alongside the primitive it wraps. A `Telemetry` is cheap to clone —
/// every instrument is held behind an `Arc`.
#[derive(Clone)]
pub struct Telemetry {
    /// `execution.count` — primary success/error tally.
    pub execution_count: Arc<CounterVec>,
    /// `execution.duration` — latency distribution.
    pub execution_duration_ms: Arc<HistogramVec>,
    /// `connection.count` — the graph-edge counter.
    pub connection_count: Arc<CounterVec>,
    /// `llm.tokens.total` — prompt/completion token consumption.
    pub llm_tokens_total: Arc<CounterVec>,
    /// `cache.hits` — numerator of hit rate.
    pub cache_hits: Arc<CounterVec>,
    /// `cache.total` — denominator of hit rate.
    pub cache_total: Arc<CounterVec>,
    /// `workflows.active` — concurrency gauge.
    pub workflows_active: Arc<GaugeVec>,
    cardinality: Arc<CardinalityGuard>,
}

impl Telemetry {
    /// Build a `Telemetry` backed by a fresh, private `Registry`, capping
    /// each instrument's label cardinality at
    /// [`DEFAULT_LABEL_CARDINALITY_CAP`].
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(&Registry::new())
    }

    /// Build a `Telemetry` registering all seven instruments against
    /// `registry`, so an embedding application can expose them alongside
    /// its own metrics on a shared scrape endpoint.
    pub fn with_registry(registry: &Registry) -> Result<Self, prometheus::Error> {
        Self::with_registry_and_cap(registry, DEFAULT_LABEL_CARDINALITY_CAP)
    }

    /// Like [`Telemetry::with_registry`], with an explicit label
    /// cardinality cap per instrument.
    pub fn with_registry_and_cap(registry: &Registry, label_cardinality_cap: usize) -> Result<Self, prometheus::Error> {
        let execution_count = CounterVec::new(
            Opts::new("execution_count", "Primitive execution outcomes"),
            &[
                "primitive_name",
                "primitive_type",
                "execution_status",
                "agent_type",
                "error_type",
            ],
        )?;
        registry.register(Box::new(execution_count.clone()))?;

        let execution_duration_ms = HistogramVec::new(
            HistogramOpts::new(
                "execution_duration_ms",
                "Primitive execution latency in milliseconds",
            )
            .buckets(DURATION_BUCKETS_MS.to_vec()),
            &["primitive_name", "primitive_type", "execution_status", "agent_type"],
        )?;
        registry.register(Box::new(execution_duration_ms.clone()))?;

        let connection_count = CounterVec::new(
            Opts::new("connection_count", "Inter-primitive connection edges traversed"),
            &["source_primitive", "target_primitive", "connection_type"],
        )?;
        registry.register(Box::new(connection_count.clone()))?;

        let llm_tokens_total = CounterVec::new(
            Opts::new("llm_tokens_total", "LLM token consumption"),
            &["llm_provider", "llm_model_name", "token_type"],
        )?;
        registry.register(Box::new(llm_tokens_total.clone()))?;

        let cache_hits = CounterVec::new(
            Opts::new("cache_hits", "Cache lookups that found a live entry"),
            &["primitive_name", "cache_type"],
        )?;
        registry.register(Box::new(cache_hits.clone()))?;

        let cache_total = CounterVec::new(
            Opts::new("cache_total", "Total cache lookups, hit or miss"),
            &["primitive_name", "cache_type"],
        )?;
        registry.register(Box::new(cache_total.clone()))?;

        let workflows_active = GaugeVec::new(
            Opts::new("workflows_active", "Outermost primitive executions currently in flight"),
            &["workflow_name", "agent_type"],
        )?;
        registry.register(Box::new(workflows_active.clone()))?;

        Ok(Self {
            execution_count: Arc::new(execution_count),
            execution_duration_ms: Arc::new(execution_duration_ms),
            connection_count: Arc::new(connection_count),
            llm_tokens_total: Arc::new(llm_tokens_total),
            cache_hits: Arc::new(cache_hits),
            cache_total: Arc::new(cache_total),
            workflows_active: Arc::new(workflows_active),
            cardinality: Arc::new(CardinalityGuard::new(label_cardinality_cap)),
        })
    }

    /// Record a connection edge traversal (spec.md §3 "Connection").
    pub fn record_connection(&self, edge: &conduit_core::Connection) {
        let key = format!(
            "{}\u{0}{}\u{0}{}",
            edge.source_primitive,
            edge.target_primitive,
            edge.connection_type.as_str()
        );
        if !self.cardinality.admit("connection_count", &key) {
            return;
        }
        self.connection_count
            .with_label_values(&[
                &edge.source_primitive,
                &edge.target_primitive,
                edge.connection_type.as_str(),
            ])
            .inc();
    }

    /// Record one cache lookup outcome.
    pub fn record_cache_lookup(&self, primitive_name: &str, cache_type: &str, hit: bool) {
        self.cache_total.with_label_values(&[primitive_name, cache_type]).inc();
        if hit {
            self.cache_hits.with_label_values(&[primitive_name, cache_type]).inc();
        }
    }

    /// Record LLM prompt/completion token consumption.
    pub fn record_llm_tokens(
        &self,
        provider: &str,
        model_name: &str,
        prompt_tokens: u64,
        completion_tokens: u64,
    ) {
        self.llm_tokens_total
            .with_label_values(&[provider, model_name, "prompt"])
            .inc_by(prompt_tokens as f64);
        self.llm_tokens_total
            .with_label_values(&[provider, model_name, "completion"])
            .inc_by(completion_tokens as f64);
    }

    pub(crate) fn record_execution(
        &self,
        primitive_name: &str,
        primitive_type: &str,
        status: &str,
        agent_type: &str,
        error_type: &str,
        duration_ms: f64,
    ) {
        let key = format!("{primitive_name}\u{0}{primitive_type}\u{0}{status}\u{0}{agent_type}\u{0}{error_type}");
        if !self.cardinality.admit("execution_count", &key) {
            return;
        }
        self.execution_count
            .with_label_values(&[primitive_name, primitive_type, status, agent_type, error_type])
            .inc();
        self.execution_duration_ms
            .with_label_values(&[primitive_name, primitive_type, status, agent_type])
            .observe(duration_ms);
    }

    pub(crate) fn workflow_started(&self, workflow_name: &str, agent_type: &str) {
        self.workflows_active.with_label_values(&[workflow_name, agent_type]).inc();
    }

    pub(crate) fn workflow_finished(&self, workflow_name: &str, agent_type: &str) {
        self.workflows_active.with_label_values(&[workflow_name, agent_type]).dec();
    }
}
