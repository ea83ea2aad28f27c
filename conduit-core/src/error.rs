//! The error taxonomy every primitive raises.
//!
//! Every variant carries enough to populate a span's `error.*` attributes
//! (`error.type`, `error.recoverable`, `error.message`) without the caller
//! reaching back into the primitive that raised it.

use thiserror::Error;

/// Errors raised by primitive execution.
///
/// Recovery primitives (`Retry`, `Fallback`, `Saga`) decide whether to
/// absorb a given error by calling [`WorkflowError::is_recoverable`] (or a
/// caller-supplied predicate over the same information); everything else
/// propagates errors unchanged.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Malformed input detected before any side effect. Not recoverable.
    #[error("validation error: {0}")]
    Validation(String),

    /// Raised by the `Timeout` primitive when its timer expires. Recoverable.
    #[error("timed out after {0}")]
    Timeout(crate::duration::DurationMs),

    /// Raised on cooperative cancellation. Recoverable by `Retry` only if
    /// configured to retry on cancellation.
    #[error("cancelled")]
    Cancelled,

    /// `Router` received an unknown key with no default configured. Not
    /// recoverable.
    #[error("no route for key {0:?}")]
    Routing(String),

    /// Fast-fail from an open circuit breaker. Recoverable (the caller
    /// should back off and retry later).
    #[error("circuit open")]
    CircuitOpen,

    /// A saga's forward step failed; wraps the original failure and reports
    /// whether rollback completed. Not recoverable by primitives above the
    /// saga.
    #[error("saga rolled back ({rollback}): {source}")]
    SagaRollback {
        /// What happened during rollback.
        rollback: SagaRollbackStatus,
        /// The original forward-step failure.
        #[source]
        source: Box<WorkflowError>,
    },

    /// Generic wrapper for an error raised inside a child primitive,
    /// preserving the child's error type in `error.type` while letting the
    /// composing primitive attach its own context.
    #[error("child primitive {primitive_type} failed: {source}")]
    Child {
        /// `primitive_type` of the child that failed.
        primitive_type: String,
        /// The child's own error.
        #[source]
        source: Box<WorkflowError>,
    },

    /// Catch-all for errors raised by embedding application code (e.g. a
    /// `Lambda` callable or a cache-backed external store).
    #[error("{0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A failure observed by a different logical caller than the one that
    /// actually ran the computation, coalesced via single-flight
    /// de-duplication (`conduit_cache::Cache`). Carries the original
    /// error's classification directly rather than re-deriving it, since
    /// the underlying error value isn't `Clone` and can't be shared as-is
    /// across every waiting caller.
    #[error("{message}")]
    Shared {
        /// The coalesced error's `error.type`, copied from the original.
        error_type: &'static str,
        /// The coalesced error's message, copied from the original.
        message: String,
        /// The coalesced error's recoverability, copied from the original.
        recoverable: bool,
    },
}

/// How a saga's compensation rollback went.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaRollbackStatus {
    /// Every pushed compensation ran successfully.
    Complete,
    /// At least one compensation itself failed; rollback continued anyway.
    Partial,
}

impl std::fmt::Display for SagaRollbackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::Partial => write!(f, "partial"),
        }
    }
}

impl WorkflowError {
    /// Whether this error is, by default, a candidate for retry/fallback
    /// absorption. Recovery primitives may override this with a
    /// caller-supplied predicate; this is only the default policy spec.md
    /// §4.3 describes ("retry on errors marked recoverable").
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Timeout(_) => true,
            Self::Cancelled => true,
            Self::Routing(_) => false,
            Self::CircuitOpen => true,
            Self::SagaRollback { .. } => false,
            Self::Child { source, .. } => source.is_recoverable(),
            Self::Other(_) => false,
            Self::Shared { recoverable, .. } => *recoverable,
        }
    }

    /// The `error.type` attribute value: a short, stable machine name for
    /// this error's variant, independent of its `Display` message.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Timeout(_) => "timeout_error",
            Self::Cancelled => "cancelled_error",
            Self::Routing(_) => "routing_error",
            Self::CircuitOpen => "circuit_open_error",
            Self::SagaRollback { .. } => "saga_rollback_error",
            Self::Child { .. } => "child_error",
            Self::Other(_) => "other_error",
            Self::Shared { error_type, .. } => *error_type,
        }
    }

    /// Build a [`WorkflowError::Shared`] copying this error's
    /// classification, for handing to a second logical caller that didn't
    /// itself run the failing computation.
    #[must_use]
    pub fn to_shared(&self) -> Self {
        Self::Shared {
            error_type: self.error_type(),
            message: self.to_string(),
            recoverable: self.is_recoverable(),
        }
    }

    /// Wrap this error as having occurred inside a child primitive of the
    /// given type, for a composing primitive to re-raise.
    #[must_use]
    pub fn into_child(self, primitive_type: impl Into<String>) -> Self {
        Self::Child {
            primitive_type: primitive_type.into(),
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_shared_preserves_classification() {
        let original = WorkflowError::Timeout(crate::duration::DurationMs::from_millis(50));
        let shared = original.to_shared();
        assert_eq!(shared.error_type(), original.error_type());
        assert_eq!(shared.is_recoverable(), original.is_recoverable());
        assert_eq!(shared.to_string(), original.to_string());
    }

    #[test]
    fn shared_validation_error_stays_unrecoverable() {
        let original = WorkflowError::Validation("bad input".into());
        let shared = original.to_shared();
        assert_eq!(shared.error_type(), "validation_error");
        assert!(!shared.is_recoverable());
    }
}
