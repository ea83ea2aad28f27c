//! Connection edges — how a run-time service map is reconstructed from
//! metrics alone.

use serde::{Deserialize, Serialize};

/// How a source primitive invoked a target primitive.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    /// Sequential chain: child *i* to child *i+1*.
    Sequential,
    /// Parallel fan-out: the parallel node to each child.
    Parallel,
    /// Fallback chain: the previously-failed primitive to the fallback
    /// actually invoked.
    Fallback,
    /// Router: the router to the matched route.
    Router,
}

impl ConnectionType {
    /// The `connection_type` metric label value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Fallback => "fallback",
            Self::Router => "router",
        }
    }
}

/// A directed edge `(source_primitive_type, target_primitive_type,
/// connection_type)`, emitted once per actual execution of a composed step.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Connection {
    /// `primitive_type` of the source primitive.
    pub source_primitive: String,
    /// `primitive_type` of the target primitive.
    pub target_primitive: String,
    /// What kind of composition produced this edge.
    pub connection_type: ConnectionType,
}

impl Connection {
    /// Create a new connection edge.
    pub fn new(
        source_primitive: impl Into<String>,
        target_primitive: impl Into<String>,
        connection_type: ConnectionType,
    ) -> Self {
        Self {
            source_primitive: source_primitive.into(),
            target_primitive: target_primitive.into(),
            connection_type,
        }
    }
}
