//! Typed messages carried by the confirmation bus.
//!
//! The message set is a closed tagged union: producers cannot invent ad-hoc
//! payloads, and subscribers can match exhaustively. Every message carries a
//! UTC timestamp; confirmation traffic additionally carries the correlation
//! id that pairs a request with its single response.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable description of a requested tool action.
///
/// Never executed by this layer; execution happens behind the
/// `ToolExecutor` seam once a call has been confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub args: serde_json::Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// The shell command for shell-style tools, when present.
    pub fn shell_command(&self) -> Option<&str> {
        self.args.get("command").and_then(|v| v.as_str())
    }
}

/// Discriminant for [`BusMessage`], used by filtered subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    ConfirmationRequest,
    ConfirmationResponse,
    PolicyRejection,
    SubAgentActivity,
    Error,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MessageKind::ConfirmationRequest => "confirmation_request",
            MessageKind::ConfirmationResponse => "confirmation_response",
            MessageKind::PolicyRejection => "policy_rejection",
            MessageKind::SubAgentActivity => "sub_agent_activity",
            MessageKind::Error => "error",
        };
        write!(f, "{label}")
    }
}

/// A message published on the [`MessageBus`](super::MessageBus).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMessage {
    /// A proposed tool call awaiting a decision.
    ConfirmationRequest {
        correlation_id: String,
        tool_call: ToolCall,
        timestamp: DateTime<Utc>,
    },
    /// The single decision for a confirmation request.
    ConfirmationResponse {
        correlation_id: String,
        confirmed: bool,
        /// Human-readable reason, present for synthesized rejections.
        reason: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// A tool call rejected outright by policy, for UI notice.
    PolicyRejection {
        correlation_id: String,
        tool_call: ToolCall,
        message: String,
        timestamp: DateTime<Utc>,
    },
    /// Progress report from a running sub-agent scope. Passes through the
    /// bus verbatim.
    SubAgentActivity {
        scope: String,
        activity: String,
        detail: serde_json::Value,
        timestamp: DateTime<Utc>,
    },
    /// An internal failure surfaced to subscribers instead of crashing the
    /// publish path.
    Error {
        context: String,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl BusMessage {
    /// Build a confirmation request with a fresh correlation id.
    pub fn confirmation_request(tool_call: ToolCall) -> Self {
        Self::confirmation_request_with_id(Uuid::new_v4().to_string(), tool_call)
    }

    pub fn confirmation_request_with_id(correlation_id: String, tool_call: ToolCall) -> Self {
        BusMessage::ConfirmationRequest {
            correlation_id,
            tool_call,
            timestamp: Utc::now(),
        }
    }

    pub fn confirmation_response(
        correlation_id: impl Into<String>,
        confirmed: bool,
        reason: Option<String>,
    ) -> Self {
        BusMessage::ConfirmationResponse {
            correlation_id: correlation_id.into(),
            confirmed,
            reason,
            timestamp: Utc::now(),
        }
    }

    pub fn policy_rejection(
        correlation_id: impl Into<String>,
        tool_call: ToolCall,
        message: impl Into<String>,
    ) -> Self {
        BusMessage::PolicyRejection {
            correlation_id: correlation_id.into(),
            tool_call,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn subagent_activity(
        scope: impl Into<String>,
        activity: impl Into<String>,
        detail: serde_json::Value,
    ) -> Self {
        BusMessage::SubAgentActivity {
            scope: scope.into(),
            activity: activity.into(),
            detail,
            timestamp: Utc::now(),
        }
    }

    pub fn error(context: impl Into<String>, message: impl Into<String>) -> Self {
        BusMessage::Error {
            context: context.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            BusMessage::ConfirmationRequest { .. } => MessageKind::ConfirmationRequest,
            BusMessage::ConfirmationResponse { .. } => MessageKind::ConfirmationResponse,
            BusMessage::PolicyRejection { .. } => MessageKind::PolicyRejection,
            BusMessage::SubAgentActivity { .. } => MessageKind::SubAgentActivity,
            BusMessage::Error { .. } => MessageKind::Error,
        }
    }

    /// The correlation id for confirmation traffic, `None` otherwise.
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            BusMessage::ConfirmationRequest { correlation_id, .. }
            | BusMessage::ConfirmationResponse { correlation_id, .. }
            | BusMessage::PolicyRejection { correlation_id, .. } => Some(correlation_id),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            BusMessage::ConfirmationRequest { timestamp, .. }
            | BusMessage::ConfirmationResponse { timestamp, .. }
            | BusMessage::PolicyRejection { timestamp, .. }
            | BusMessage::SubAgentActivity { timestamp, .. }
            | BusMessage::Error { timestamp, .. } => *timestamp,
        }
    }
}
