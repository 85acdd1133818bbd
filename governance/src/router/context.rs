//! Inputs to a routing decision.

use std::fmt;

use tokio_util::sync::CancellationToken;

use crate::model::Turn;

/// Why the agent is about to call the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnType {
    /// A fresh user prompt. The only turn type that gets routed.
    #[default]
    UserInput,
    /// Continuing after tool results. The turn must finish on the model
    /// that produced the tool calls.
    ToolResponseContinuation,
    /// Internal bookkeeping call deciding who speaks next.
    NextSpeakerCheck,
}

impl TurnType {
    /// Continuation turns skip the strategy chain and reuse the session's
    /// current model.
    pub fn bypasses_routing(&self) -> bool {
        !matches!(self, TurnType::UserInput)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TurnType::UserInput => "user_input",
            TurnType::ToolResponseContinuation => "tool_response_continuation",
            TurnType::NextSpeakerCheck => "next_speaker_check",
        }
    }
}

impl fmt::Display for TurnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything a strategy may inspect when choosing a model.
#[derive(Debug, Clone)]
pub struct RoutingContext {
    /// Correlates the decision with the prompt it routed.
    pub prompt_id: String,
    pub turn_type: TurnType,
    /// Conversation so far, oldest first.
    pub history: Vec<Turn>,
    /// The text of the prompt being routed.
    pub request_text: String,
    /// Hard pin requested by the caller; wins over every strategy.
    pub forced_model: Option<String>,
    pub cancel: CancellationToken,
}

impl RoutingContext {
    pub fn new(prompt_id: impl Into<String>, request_text: impl Into<String>) -> Self {
        Self {
            prompt_id: prompt_id.into(),
            turn_type: TurnType::UserInput,
            history: Vec::new(),
            request_text: request_text.into(),
            forced_model: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_turn_type(mut self, turn_type: TurnType) -> Self {
        self.turn_type = turn_type;
        self
    }

    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_forced_model(mut self, model: impl Into<String>) -> Self {
        self.forced_model = Some(model.into());
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}
