//! Configuration and result types for sub-agent scopes.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::SubAgentError;

/// Fixed generation settings for a scope. Sub-agents never route: the model
/// named here serves every turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
}

impl ModelConfig {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 0.2,
            top_p: 0.95,
        }
    }
}

/// Hard limits on a scope's execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RunConfig {
    /// Maximum model turns before forced termination.
    pub max_turns: u32,
    /// Wall-clock budget. Zero times out on the first turn check.
    pub max_time_minutes: u64,
}

impl RunConfig {
    pub fn new(max_turns: u32, max_time_minutes: u64) -> Self {
        Self {
            max_turns,
            max_time_minutes,
        }
    }

    pub fn max_time(&self) -> Duration {
        Duration::from_secs(self.max_time_minutes * 60)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_turns: 15,
            max_time_minutes: 5,
        }
    }
}

/// The scope's task description, templated against [`ContextState`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// May contain `${variable}` placeholders; every placeholder must be
    /// present in the context state at run time.
    pub system_prompt: String,
}

impl PromptConfig {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }
}

/// Outputs the scope must emit before it can finish by goal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output name to human-readable description.
    pub expected: BTreeMap<String, String>,
}

impl OutputConfig {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_output(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        self.expected.insert(name.into(), description.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.expected.is_empty()
    }
}

/// Key/value inputs available for prompt templating.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextState(BTreeMap<String, serde_json::Value>);

impl ContextState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Rendering form: JSON strings lose their quotes, everything else is
    /// compact JSON.
    pub fn render_value(&self, key: &str) -> Option<String> {
        self.get(key).map(|value| match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Why a scope stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminateMode {
    /// The model finished its work (and emitted every declared output).
    Goal,
    /// Wall-clock budget exceeded.
    Timeout,
    /// Turn budget exceeded.
    MaxTurns,
    /// Unrecoverable failure.
    Error,
}

impl TerminateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminateMode::Goal => "goal",
            TerminateMode::Timeout => "timeout",
            TerminateMode::MaxTurns => "max_turns",
            TerminateMode::Error => "error",
        }
    }
}

impl fmt::Display for TerminateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything a finished scope hands back to its caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubAgentOutput {
    pub terminate_mode: TerminateMode,
    /// Values the scope emitted, keyed by declared output name.
    pub emitted_outputs: BTreeMap<String, serde_json::Value>,
    pub turns_used: u32,
    pub elapsed: Duration,
}

impl SubAgentOutput {
    /// Fetch a declared output, failing loudly when the scope never emitted
    /// it. Callers use this instead of silently tolerating holes.
    pub fn require(&self, name: &str) -> Result<&serde_json::Value, SubAgentError> {
        self.emitted_outputs
            .get(name)
            .ok_or_else(|| SubAgentError::ContractViolation {
                output: name.to_string(),
            })
    }

    pub fn emitted(&self, name: &str) -> Option<&serde_json::Value> {
        self.emitted_outputs.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_config_zero_minutes_is_a_zero_budget() {
        let config = RunConfig::new(3, 0);
        assert_eq!(config.max_time(), Duration::ZERO);
        assert_eq!(RunConfig::default().max_time(), Duration::from_secs(300));
    }

    #[test]
    fn context_state_renders_strings_bare() {
        let state = ContextState::new()
            .with("target", "src/lib.rs")
            .with("count", 3);
        assert_eq!(state.render_value("target").unwrap(), "src/lib.rs");
        assert_eq!(state.render_value("count").unwrap(), "3");
        assert!(state.render_value("missing").is_none());
    }

    #[test]
    fn require_names_the_missing_output() {
        let output = SubAgentOutput {
            terminate_mode: TerminateMode::Goal,
            emitted_outputs: BTreeMap::from([("summary".to_string(), json!("done"))]),
            turns_used: 2,
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(output.require("summary").unwrap(), &json!("done"));

        let error = output.require("verdict").unwrap_err();
        assert!(error.to_string().contains("verdict"));
    }

    #[test]
    fn terminate_mode_display_is_snake_case() {
        assert_eq!(TerminateMode::MaxTurns.to_string(), "max_turns");
        assert_eq!(
            serde_json::to_value(TerminateMode::Goal).unwrap(),
            json!("goal")
        );
    }
}
