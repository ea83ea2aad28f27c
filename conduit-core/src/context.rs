//! The context value threaded through every primitive execution.

use crate::id::{CorrelationId, SessionId, WorkflowId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// W3C trace context carrier fields, propagated to telemetry APIs.
#[derive(Debug, Clone, Default)]
pub struct TraceCarrier {
    /// The `traceparent` header value, if this execution is part of an
    /// externally-initiated trace.
    pub traceparent: Option<String>,
    /// The `tracestate` header value.
    pub tracestate: Option<String>,
}

/// An immutable-by-convention value carried through every primitive
/// execution.
///
/// Created once at the outer boundary via [`WorkflowContext::new`] and
/// forked at each composition step via [`WorkflowContext::child`] — never
/// shared by reference for mutation. The one exception is
/// [`WorkflowContext::state`], which is explicitly shared so that siblings
/// in a composition can observe each other's writes when the composition
/// intends it (spec.md §3, §5 — undefined results if two parallel siblings
/// write the same key without coordinating through a higher-level
/// primitive).
#[derive(Debug, Clone)]
pub struct WorkflowContext {
    /// Identity of the workflow execution this context belongs to.
    pub workflow_id: WorkflowId,
    /// Correlation id linking related executions (e.g. across a retry).
    pub correlation_id: Option<CorrelationId>,
    /// Conversation/session this execution belongs to.
    pub session_id: Option<SessionId>,
    /// Opaque reference to the span that produced this context, set by the
    /// instrumentation wrapper when a primitive forks a child context.
    pub parent_span_reference: Option<String>,

    /// Agent identity descriptor, inherited by children.
    pub agent_id: Option<String>,
    /// Agent type/class descriptor, inherited by children.
    pub agent_type: Option<String>,
    /// Human-readable workflow name, inherited by children.
    pub workflow_name: Option<String>,
    /// LLM provider name, inherited by children.
    pub llm_provider: Option<String>,
    /// LLM model name, inherited by children.
    pub llm_model_name: Option<String>,
    /// LLM model tier/size class, inherited by children.
    pub llm_model_tier: Option<String>,

    /// W3C trace context carrier.
    pub trace: TraceCarrier,

    /// Cross-cutting tags that should appear on spans. Inherited (copied,
    /// not shared) by children — a child may add entries without those
    /// entries becoming visible to siblings or the parent.
    pub metadata: HashMap<String, serde_json::Value>,

    /// Workflow-local scratch space, not emitted to telemetry. Shared by
    /// reference across a composition so siblings can observe each other's
    /// writes; see the struct-level note on concurrent access.
    state: Arc<Mutex<HashMap<String, serde_json::Value>>>,
}

impl WorkflowContext {
    /// Create a new outermost context. All descriptors start unset; use the
    /// `with_*` builder methods to populate them before the first
    /// `execute` call.
    #[must_use]
    pub fn new(workflow_id: impl Into<WorkflowId>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            correlation_id: None,
            session_id: None,
            parent_span_reference: None,
            agent_id: None,
            agent_type: None,
            workflow_name: None,
            llm_provider: None,
            llm_model_name: None,
            llm_model_tier: None,
            trace: TraceCarrier::default(),
            metadata: HashMap::new(),
            state: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Set the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<CorrelationId>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Set the session id.
    #[must_use]
    pub fn with_session_id(mut self, id: impl Into<SessionId>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    /// Set the agent id descriptor.
    #[must_use]
    pub fn with_agent_id(mut self, id: impl Into<String>) -> Self {
        self.agent_id = Some(id.into());
        self
    }

    /// Set the agent type descriptor.
    #[must_use]
    pub fn with_agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = Some(agent_type.into());
        self
    }

    /// Set the workflow name descriptor.
    #[must_use]
    pub fn with_workflow_name(mut self, name: impl Into<String>) -> Self {
        self.workflow_name = Some(name.into());
        self
    }

    /// Set the LLM provider/model descriptors in one call.
    #[must_use]
    pub fn with_llm(
        mut self,
        provider: impl Into<String>,
        model_name: impl Into<String>,
        model_tier: Option<String>,
    ) -> Self {
        self.llm_provider = Some(provider.into());
        self.llm_model_name = Some(model_name.into());
        self.llm_model_tier = model_tier;
        self
    }

    /// Set the W3C trace carrier.
    #[must_use]
    pub fn with_trace(mut self, trace: TraceCarrier) -> Self {
        self.trace = trace;
        self
    }

    /// Insert a metadata entry that should appear on every descendant span.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.metadata.insert(key.into(), value);
    }

    /// Read a value from the shared workflow-local scratch space.
    #[must_use]
    pub fn state_get(&self, key: &str) -> Option<serde_json::Value> {
        self.state.lock().expect("state mutex poisoned").get(key).cloned()
    }

    /// Write a value into the shared workflow-local scratch space, visible
    /// to every context forked from the same root (including siblings
    /// already dispatched, once they next read it).
    pub fn state_set(&self, key: impl Into<String>, value: serde_json::Value) {
        self.state
            .lock()
            .expect("state mutex poisoned")
            .insert(key.into(), value);
    }

    /// Produce a child context for a delegated execution.
    ///
    /// Propagates every descriptor, copies `metadata`, preserves `state` by
    /// reference, and replaces `parent_span_reference` with `current_span` —
    /// implementing the four composition rules from spec.md §3.
    #[must_use]
    pub fn child(&self, current_span: impl Into<String>) -> Self {
        Self {
            workflow_id: self.workflow_id.clone(),
            correlation_id: self.correlation_id.clone(),
            session_id: self.session_id.clone(),
            parent_span_reference: Some(current_span.into()),
            agent_id: self.agent_id.clone(),
            agent_type: self.agent_type.clone(),
            workflow_name: self.workflow_name.clone(),
            llm_provider: self.llm_provider.clone(),
            llm_model_name: self.llm_model_name.clone(),
            llm_model_tier: self.llm_model_tier.clone(),
            trace: self.trace.clone(),
            metadata: self.metadata.clone(),
            state: Arc::clone(&self.state),
        }
    }
}
