//! Request/response shapes crossing the model transport boundary.
//!
//! The wire transport itself lives outside this layer. Embedders implement
//! [`ModelClient`] over whatever HTTP stack they use; only the shapes are
//! fixed here so the router, the retry controller and the sub-agent loop
//! can be exercised against scripted clients in tests.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::resilience::ApiError;

/// A single content part within a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Part {
    /// Plain text produced by the user or the model.
    Text { text: String },
    /// A tool invocation requested by the model.
    FunctionCall {
        name: String,
        args: serde_json::Value,
    },
    /// The result of a tool invocation, sent back to the model.
    FunctionResponse {
        name: String,
        response: serde_json::Value,
    },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn function_call(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self::FunctionCall {
            name: name.into(),
            args,
        }
    }

    pub fn function_response(name: impl Into<String>, response: serde_json::Value) -> Self {
        Self::FunctionResponse {
            name: name.into(),
            response,
        }
    }

    /// True when this part is a tool invocation or a tool result.
    pub fn is_tool_traffic(&self) -> bool {
        matches!(
            self,
            Part::FunctionCall { .. } | Part::FunctionResponse { .. }
        )
    }
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
}

/// One turn of conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Turn {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: Role::Model,
            parts,
        }
    }

    /// True when any part of this turn carries tool traffic.
    pub fn has_tool_traffic(&self) -> bool {
        self.parts.iter().any(Part::is_tool_traffic)
    }
}

/// Declaration of a callable tool, sent alongside a request.
///
/// `parameters` is a JSON schema object describing the tool's arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A fully-specified model call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    pub model: String,
    pub system_prompt: Option<String>,
    pub history: Vec<Turn>,
    pub tools: Vec<FunctionDeclaration>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

impl ModelRequest {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system_prompt: None,
            history: Vec::new(),
            tools: Vec::new(),
            temperature: None,
            top_p: None,
            max_output_tokens: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }

    pub fn with_tools(mut self, tools: Vec<FunctionDeclaration>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }
}

/// The model's reply to a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub parts: Vec<Part>,
}

impl ModelResponse {
    pub fn from_parts(parts: Vec<Part>) -> Self {
        Self { parts }
    }

    /// All text parts concatenated, in order.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            if let Part::Text { text } = part {
                out.push_str(text);
            }
        }
        out
    }

    /// Tool invocations requested by this response, in order.
    pub fn function_calls(&self) -> Vec<(&str, &serde_json::Value)> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::FunctionCall { name, args } => Some((name.as_str(), args)),
                _ => None,
            })
            .collect()
    }

    /// True when the response carries no content at all.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Seam to the remote model transport.
///
/// Implementations perform the actual network call and must honor any
/// cooperative cancellation signal their embedder threads through; the
/// governance layer checks cancellation at call boundaries and during
/// retry sleeps only.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, ApiError>;
}

pub type SharedModelClient = Arc<dyn ModelClient>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_serde_uses_kind_tag() {
        let part = Part::text("hello");
        let json = serde_json::to_value(&part).unwrap();
        assert_eq!(json["kind"], "text");
        assert_eq!(json["text"], "hello");

        let call = Part::function_call("read_file", serde_json::json!({"path": "src/lib.rs"}));
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["kind"], "function_call");
        assert_eq!(json["name"], "read_file");
    }

    #[test]
    fn turn_detects_tool_traffic() {
        let plain = Turn::user(vec![Part::text("explain this repo")]);
        assert!(!plain.has_tool_traffic());

        let with_call = Turn::model(vec![
            Part::text("let me look"),
            Part::function_call("read_file", serde_json::json!({"path": "a"})),
        ]);
        assert!(with_call.has_tool_traffic());
    }

    #[test]
    fn response_text_concatenates_in_order() {
        let response = ModelResponse::from_parts(vec![
            Part::text("first "),
            Part::function_call("noop", serde_json::json!({})),
            Part::text("second"),
        ]);
        assert_eq!(response.text(), "first second");
    }

    #[test]
    fn response_collects_function_calls_in_order() {
        let response = ModelResponse::from_parts(vec![
            Part::function_call("read_file", serde_json::json!({"path": "a"})),
            Part::text("..."),
            Part::function_call("list_directory", serde_json::json!({"path": "."})),
        ]);
        let calls = response.function_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "read_file");
        assert_eq!(calls[1].0, "list_directory");
    }

    #[test]
    fn empty_response_is_flagged() {
        assert!(ModelResponse::default().is_empty());
        assert!(!ModelResponse::from_parts(vec![Part::text("x")]).is_empty());
    }
}
