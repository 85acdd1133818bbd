//! Structured telemetry for routing, resilience, and sub-agent runs.
//!
//! Components report through the [`TelemetrySink`] seam and never depend on
//! a concrete backend. Events are plain serializable values, so a sink can
//! log them, buffer them, or ship them elsewhere.
//!
//! | Event                | Emitted by             | When                        |
//! |----------------------|------------------------|-----------------------------|
//! | `RoutingDecided`     | `ModelRouter`          | once per routed prompt      |
//! | `FallbackEntered`    | `FallbackCoordinator`  | first fallback transition   |
//! | `RetryWait`          | `retry_with_backoff`   | before each retry sleep     |
//! | `SubAgentFinished`   | `SubAgentScope`        | scope termination           |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const LOG_TARGET: &str = "governance.telemetry";

/// Shared handle to a telemetry sink.
pub type SharedTelemetry = Arc<dyn TelemetrySink>;

/// One reportable occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// A routing decision was finalized.
    RoutingDecided {
        prompt_id: String,
        model: String,
        source: String,
        latency_ms: u64,
        reasoning: Option<String>,
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// The session switched to its fallback model.
    FallbackEntered {
        failed_model: String,
        fallback_model: String,
        intent: String,
        timestamp: DateTime<Utc>,
    },
    /// A retry loop is about to sleep.
    RetryWait {
        attempt: u32,
        delay_ms: u64,
        /// True when the delay came from the server rather than the
        /// exponential schedule.
        server_declared: bool,
        timestamp: DateTime<Utc>,
    },
    /// A sub-agent scope terminated.
    SubAgentFinished {
        name: String,
        terminate_mode: String,
        turns: u32,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl TelemetryEvent {
    pub fn routing_decided(
        prompt_id: impl Into<String>,
        model: impl Into<String>,
        source: impl Into<String>,
        latency_ms: u64,
        reasoning: Option<String>,
        error: Option<String>,
    ) -> Self {
        TelemetryEvent::RoutingDecided {
            prompt_id: prompt_id.into(),
            model: model.into(),
            source: source.into(),
            latency_ms,
            reasoning,
            error,
            timestamp: Utc::now(),
        }
    }

    pub fn fallback_entered(
        failed_model: impl Into<String>,
        fallback_model: impl Into<String>,
        intent: impl Into<String>,
    ) -> Self {
        TelemetryEvent::FallbackEntered {
            failed_model: failed_model.into(),
            fallback_model: fallback_model.into(),
            intent: intent.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn retry_wait(attempt: u32, delay_ms: u64, server_declared: bool) -> Self {
        TelemetryEvent::RetryWait {
            attempt,
            delay_ms,
            server_declared,
            timestamp: Utc::now(),
        }
    }

    pub fn subagent_finished(
        name: impl Into<String>,
        terminate_mode: impl Into<String>,
        turns: u32,
        elapsed_ms: u64,
    ) -> Self {
        TelemetryEvent::SubAgentFinished {
            name: name.into(),
            terminate_mode: terminate_mode.into(),
            turns,
            elapsed_ms,
            timestamp: Utc::now(),
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            TelemetryEvent::RoutingDecided { .. } => "routing_decided",
            TelemetryEvent::FallbackEntered { .. } => "fallback_entered",
            TelemetryEvent::RetryWait { .. } => "retry_wait",
            TelemetryEvent::SubAgentFinished { .. } => "sub_agent_finished",
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            TelemetryEvent::RoutingDecided { timestamp, .. }
            | TelemetryEvent::FallbackEntered { timestamp, .. }
            | TelemetryEvent::RetryWait { timestamp, .. }
            | TelemetryEvent::SubAgentFinished { timestamp, .. } => *timestamp,
        }
    }

    /// Write the event to the tracing pipeline as structured fields.
    pub fn emit(&self) {
        match self {
            TelemetryEvent::RoutingDecided {
                prompt_id,
                model,
                source,
                latency_ms,
                reasoning,
                error,
                ..
            } => {
                tracing::info!(
                    target: LOG_TARGET,
                    event = self.event_type(),
                    prompt_id = %prompt_id,
                    model = %model,
                    source = %source,
                    latency_ms,
                    reasoning = reasoning.as_deref().unwrap_or(""),
                    error = error.as_deref().unwrap_or(""),
                    "routing decided"
                );
            }
            TelemetryEvent::FallbackEntered {
                failed_model,
                fallback_model,
                intent,
                ..
            } => {
                tracing::warn!(
                    target: LOG_TARGET,
                    event = self.event_type(),
                    failed_model = %failed_model,
                    fallback_model = %fallback_model,
                    intent = %intent,
                    "entered fallback mode"
                );
            }
            TelemetryEvent::RetryWait {
                attempt,
                delay_ms,
                server_declared,
                ..
            } => {
                tracing::info!(
                    target: LOG_TARGET,
                    event = self.event_type(),
                    attempt,
                    delay_ms,
                    server_declared,
                    "waiting before retry"
                );
            }
            TelemetryEvent::SubAgentFinished {
                name,
                terminate_mode,
                turns,
                elapsed_ms,
                ..
            } => {
                tracing::info!(
                    target: LOG_TARGET,
                    event = self.event_type(),
                    name = %name,
                    terminate_mode = %terminate_mode,
                    turns,
                    elapsed_ms,
                    "sub-agent finished"
                );
            }
        }
    }
}

/// Destination for telemetry events.
///
/// `record` is called from hot paths and must not block.
pub trait TelemetrySink: Send + Sync {
    fn record(&self, event: TelemetryEvent);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn record(&self, _event: TelemetryEvent) {}
}

/// Sink that forwards events to the tracing pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn record(&self, event: TelemetryEvent) {
        event.emit();
    }
}

/// Install a global fmt subscriber honoring `RUST_LOG`, defaulting to
/// `info`. Safe to call more than once.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Subscriber for tests: captured output, debug level.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
