//! Governance and resilience layer for an autonomous coding agent.
//!
//! This library provides:
//! - Deterministic policy gating for proposed tool calls
//! - A typed confirmation bus pairing each request with exactly one response
//! - Retry with exponential backoff, quota classification, and model fallback
//! - A strategy-chain model router that never fails a prompt
//!
//! # Flow
//!
//! ```text
//!   prompt ──> ModelRouter ──> ModelClient ──> retry_with_backoff
//!                 |                                   |
//!                 |                          terminal quota?
//!                 |                                   v
//!                 |                          FallbackCoordinator ──> SessionState
//!                 |                                                      |
//!                 `────────────── fallback strategy reads flag ──────────'
//!
//!   tool call ──> MessageBus ──> PolicyEngine ──> allow / deny / ask user
//! ```
//!
//! Everything here is transport-agnostic: the model API lives behind
//! [`ModelClient`](model::ModelClient), tool execution behind the host
//! application. This crate decides; hosts act.

#![allow(dead_code)]
#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod messages;
pub mod model;
pub mod policy;
pub mod resilience;
pub mod router;
pub mod session;
pub mod telemetry;

// Re-export key policy types
pub use policy::{
    load_policy_file, ApprovalMode, PolicyConfig, PolicyDecision, PolicyEngine, PolicyError,
    PolicyProvider, PolicyRule, RuleMatcher, SharedPolicyEngine,
};

// Re-export key message bus types
pub use messages::{
    BusMessage, ConfirmationOutcome, FilteredReceiver, MessageBus, MessageFilter, MessageKind,
    SharedMessageBus, ToolCall,
};

// Re-export key resilience types
pub use resilience::{
    classify, retry_with_backoff, ApiError, ErrorClass, FallbackCoordinator, FallbackDecider,
    FallbackHandler, FallbackIntent, RetryOptions,
};

// Re-export key router types
pub use router::{
    ModelRouter, RouteSource, RouteStrategy, RoutingContext, RoutingDecision, RoutingError,
    SharedModelRouter, TurnType,
};

// Re-export model seam types
pub use model::{
    FunctionDeclaration, ModelClient, ModelRequest, ModelResponse, Part, Role, SharedModelClient,
    Turn,
};

// Re-export session and configuration types
pub use config::{ConfigError, GovernanceConfig, ModelCatalog, RetryTuning, RouterTuning, AUTO_MODEL};
pub use session::{AuthType, SessionState, SharedSessionState};

// Re-export telemetry types
pub use telemetry::{
    init_logging, init_test_logging, NoopTelemetry, SharedTelemetry, TelemetryEvent,
    TelemetrySink, TracingTelemetry,
};
