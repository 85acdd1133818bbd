//! Policy-aware broadcast bus for confirmation traffic.
//!
//! The bus sits between tool schedulers and whatever answers confirmation
//! prompts. Publishing never returns an error and never panics; problems
//! become [`BusMessage::Error`] events so subscribers stay informed.
//!
//! ```text
//!   publish(ConfirmationRequest)
//!            |
//!            v
//!      policy check ── Allow ──> synthesized approval
//!            |          Deny ──> PolicyRejection + synthesized refusal
//!            |          AskUser > request forwarded to subscribers
//!            `── failure ──────> Error event + synthesized refusal
//! ```
//!
//! Everything that is not a confirmation request passes through verbatim.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::policy::{PolicyDecision, PolicyProvider};

use super::types::{BusMessage, MessageKind, ToolCall};

/// Broadcast channel depth. Slow subscribers past this lag drop the oldest
/// messages rather than blocking publishers.
pub const BUS_CAPACITY: usize = 256;

const LOG_TARGET: &str = "governance.bus";

/// Shared handle to a [`MessageBus`].
pub type SharedMessageBus = Arc<MessageBus>;

/// Result of a [`MessageBus::confirm`] round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmationOutcome {
    Approved,
    Rejected { reason: Option<String> },
}

impl ConfirmationOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, ConfirmationOutcome::Approved)
    }

    fn rejected(reason: impl Into<String>) -> Self {
        ConfirmationOutcome::Rejected {
            reason: Some(reason.into()),
        }
    }
}

/// Subscriber-side predicate for [`FilteredReceiver`].
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    kinds: Option<HashSet<MessageKind>>,
    correlation_id: Option<String>,
}

impl MessageFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept only the given kind. Can be called repeatedly to widen the set.
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kinds.get_or_insert_with(HashSet::new).insert(kind);
        self
    }

    /// Accept only messages carrying this correlation id.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn matches(&self, message: &BusMessage) -> bool {
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&message.kind()) {
                return false;
            }
        }
        if let Some(wanted) = &self.correlation_id {
            if message.correlation_id() != Some(wanted.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Receiver that skips messages its filter rejects.
pub struct FilteredReceiver {
    inner: broadcast::Receiver<BusMessage>,
    filter: MessageFilter,
}

impl FilteredReceiver {
    /// Next message passing the filter. Lag and closure propagate to the
    /// caller unchanged.
    pub async fn recv(&mut self) -> Result<BusMessage, broadcast::error::RecvError> {
        loop {
            let message = self.inner.recv().await?;
            if self.filter.matches(&message) {
                return Ok(message);
            }
        }
    }
}

/// Typed pub/sub hub that consults policy before forwarding confirmation
/// requests.
pub struct MessageBus {
    sender: broadcast::Sender<BusMessage>,
    policy: Arc<dyn PolicyProvider>,
}

impl MessageBus {
    pub fn new(policy: Arc<dyn PolicyProvider>) -> Self {
        Self::with_capacity(policy, BUS_CAPACITY)
    }

    pub fn with_capacity(policy: Arc<dyn PolicyProvider>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, policy }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.sender.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: MessageFilter) -> FilteredReceiver {
        FilteredReceiver {
            inner: self.sender.subscribe(),
            filter,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn shared(self) -> SharedMessageBus {
        Arc::new(self)
    }

    /// Publish a message. Infallible: malformed input and policy failures
    /// turn into [`BusMessage::Error`] events instead of panics or silent
    /// approvals.
    pub fn publish(&self, message: BusMessage) {
        if let Err(problem) = validate(&message) {
            tracing::warn!(
                target: LOG_TARGET,
                kind = %message.kind(),
                problem,
                "dropping malformed message"
            );
            self.send(BusMessage::error(
                "message_bus",
                format!("dropped malformed {} message: {problem}", message.kind()),
            ));
            return;
        }

        match message {
            BusMessage::ConfirmationRequest {
                correlation_id,
                tool_call,
                timestamp,
            } => self.route_request(correlation_id, tool_call, timestamp),
            other => self.send(other),
        }
    }

    /// Publish a confirmation request for `tool_call` and wait for its
    /// response. Synthesized responses resolve immediately; otherwise some
    /// subscriber has to answer before `timeout` elapses.
    ///
    /// A timeout rejects locally and surfaces an error event. No synthesized
    /// response is published for it, so a late human answer cannot race a
    /// second response for the same correlation id.
    pub async fn confirm(&self, tool_call: ToolCall, timeout: Duration) -> ConfirmationOutcome {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        // Subscribe before publishing so an immediate synthesized response
        // cannot be missed.
        let mut receiver = self.subscribe();
        self.publish(BusMessage::confirmation_request_with_id(
            correlation_id.clone(),
            tool_call,
        ));

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    tracing::warn!(
                        target: LOG_TARGET,
                        correlation_id = %correlation_id,
                        timeout_ms = timeout.as_millis() as u64,
                        "confirmation timed out"
                    );
                    self.send(BusMessage::error(
                        "message_bus",
                        format!("confirmation {correlation_id} timed out"),
                    ));
                    return ConfirmationOutcome::rejected("confirmation timed out");
                }
                received = receiver.recv() => match received {
                    Ok(BusMessage::ConfirmationResponse {
                        correlation_id: id,
                        confirmed,
                        reason,
                        ..
                    }) if id == correlation_id => {
                        return if confirmed {
                            ConfirmationOutcome::Approved
                        } else {
                            ConfirmationOutcome::Rejected { reason }
                        };
                    }
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            target: LOG_TARGET,
                            correlation_id = %correlation_id,
                            skipped,
                            "confirmation receiver lagged"
                        );
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return ConfirmationOutcome::rejected("message bus closed");
                    }
                },
            }
        }
    }

    fn route_request(
        &self,
        correlation_id: String,
        tool_call: ToolCall,
        timestamp: chrono::DateTime<chrono::Utc>,
    ) {
        match self.policy.check(&tool_call) {
            Ok(PolicyDecision::Allow) => {
                tracing::debug!(
                    target: LOG_TARGET,
                    correlation_id = %correlation_id,
                    tool = %tool_call.name,
                    "policy allowed tool call"
                );
                self.send(BusMessage::confirmation_response(
                    correlation_id,
                    true,
                    None,
                ));
            }
            Ok(PolicyDecision::Deny) => {
                tracing::info!(
                    target: LOG_TARGET,
                    correlation_id = %correlation_id,
                    tool = %tool_call.name,
                    "policy denied tool call"
                );
                let message = format!("policy denied tool call '{}'", tool_call.name);
                self.send(BusMessage::policy_rejection(
                    correlation_id.clone(),
                    tool_call,
                    message.clone(),
                ));
                self.send(BusMessage::confirmation_response(
                    correlation_id,
                    false,
                    Some(message),
                ));
            }
            Ok(PolicyDecision::AskUser) => {
                tracing::debug!(
                    target: LOG_TARGET,
                    correlation_id = %correlation_id,
                    tool = %tool_call.name,
                    "forwarding tool call for confirmation"
                );
                self.send(BusMessage::ConfirmationRequest {
                    correlation_id,
                    tool_call,
                    timestamp,
                });
            }
            // A policy backend failure must read as a denial, never an
            // approval.
            Err(error) => {
                tracing::error!(
                    target: LOG_TARGET,
                    correlation_id = %correlation_id,
                    tool = %tool_call.name,
                    error = %error,
                    "policy check failed; denying tool call"
                );
                self.send(BusMessage::error(
                    "message_bus",
                    format!("policy check failed for '{}': {error}", tool_call.name),
                ));
                self.send(BusMessage::confirmation_response(
                    correlation_id,
                    false,
                    Some(format!("policy check failed: {error}")),
                ));
            }
        }
    }

    /// Send on the broadcast channel, ignoring the no-subscribers case.
    fn send(&self, message: BusMessage) {
        let _ = self.sender.send(message);
    }
}

fn validate(message: &BusMessage) -> Result<(), &'static str> {
    if let Some(correlation_id) = message.correlation_id() {
        if correlation_id.is_empty() {
            return Err("empty correlation id");
        }
    }
    if let BusMessage::ConfirmationRequest { tool_call, .. } = message {
        if tool_call.name.is_empty() {
            return Err("empty tool name");
        }
    }
    Ok(())
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
