//! Routing decisions and their provenance.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::resilience::ApiError;

/// Which rung of the chain produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteSource {
    /// Caller pinned the model explicitly.
    Forced,
    /// Continuation turn reused the session's current model.
    Continuity,
    /// Session is in fallback mode.
    Fallback,
    /// User override for the session.
    Override,
    /// Complexity classifier picked the tier.
    Classifier,
    /// Nothing else decided; terminal default.
    Default,
}

impl RouteSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteSource::Forced => "forced",
            RouteSource::Continuity => "continuity",
            RouteSource::Fallback => "fallback",
            RouteSource::Override => "override",
            RouteSource::Classifier => "classifier",
            RouteSource::Default => "default",
        }
    }
}

impl fmt::Display for RouteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provenance attached to every decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteMetadata {
    pub source: RouteSource,
    /// Wall time spent routing, stamped when the decision is finalized.
    pub latency_ms: u64,
    /// Classifier's self-reported reasoning, or a note from the deciding
    /// strategy.
    pub reasoning: Option<String>,
    /// Failure absorbed on the way to this decision, if any strategy errored
    /// before a later one decided.
    pub error: Option<String>,
}

impl RouteMetadata {
    pub fn new(source: RouteSource) -> Self {
        Self {
            source,
            latency_ms: 0,
            reasoning: None,
            error: None,
        }
    }
}

/// The routed model plus how it was chosen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub model: String,
    pub metadata: RouteMetadata,
}

impl RoutingDecision {
    pub fn new(model: impl Into<String>, source: RouteSource) -> Self {
        Self {
            model: model.into(),
            metadata: RouteMetadata::new(source),
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.metadata.reasoning = Some(reasoning.into());
        self
    }
}

/// Failure inside a single strategy. The router absorbs these and falls
/// through the chain; they never reach route() callers.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("classifier call failed: {0}")]
    Classifier(#[from] ApiError),

    #[error("classifier returned a malformed decision: {0}")]
    MalformedDecision(String),

    #[error("routing cancelled")]
    Cancelled,
}
