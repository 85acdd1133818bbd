//! Declarative policy configuration.
//!
//! Rules are written in TOML and compiled into matchers at load time, so a
//! malformed entry fails the load instead of silently never matching:
//!
//! ```toml
//! default = "ask_user"
//!
//! [[rules]]
//! tool = "run_shell_command"
//! prefix = "rm -rf"
//! decision = "deny"
//!
//! [[rules]]
//! tool = "read_file"
//! decision = "allow"
//! ```

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::engine::PolicyEngine;
use super::rule::{PolicyDecision, PolicyRule, RuleMatcher};
use super::PolicyError;

/// On-disk shape of a policy section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Decision when no rule matches.
    pub default: PolicyDecision,
    /// Ordered rule entries; earlier entries win.
    pub rules: Vec<RuleEntry>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            default: PolicyDecision::AskUser,
            rules: Vec::new(),
        }
    }
}

/// One declarative rule. Exactly one matching style applies per entry:
/// `prefix` (requires `tool`), `args_pattern` (optionally scoped by `tool`),
/// bare `tool`, or none of them for a catch-all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleEntry {
    pub tool: Option<String>,
    pub prefix: Option<String>,
    pub args_pattern: Option<String>,
    pub decision: Option<PolicyDecision>,
}

impl RuleEntry {
    fn compile(&self, index: usize) -> Result<PolicyRule, PolicyError> {
        let decision = self.decision.ok_or_else(|| {
            PolicyError::InvalidRule(format!("rule {index}: missing decision"))
        })?;

        let matcher = match (&self.tool, &self.prefix, &self.args_pattern) {
            (_, Some(_), Some(_)) => {
                return Err(PolicyError::InvalidRule(format!(
                    "rule {index}: prefix and args_pattern are mutually exclusive"
                )));
            }
            (Some(tool), Some(prefix), None) => RuleMatcher::ShellPrefix {
                tool: tool.clone(),
                prefix: prefix.clone(),
            },
            (None, Some(_), None) => {
                return Err(PolicyError::InvalidRule(format!(
                    "rule {index}: prefix requires tool"
                )));
            }
            (tool, None, Some(pattern)) => {
                let pattern = Regex::new(pattern).map_err(|e| {
                    PolicyError::InvalidRule(format!("rule {index}: bad args_pattern: {e}"))
                })?;
                RuleMatcher::ArgsPattern {
                    tool: tool.clone(),
                    pattern,
                }
            }
            (Some(tool), None, None) => RuleMatcher::ToolName(tool.clone()),
            (None, None, None) => RuleMatcher::Any,
        };

        Ok(PolicyRule::new(matcher, decision))
    }
}

impl PolicyConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, PolicyError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Compile every entry, preserving file order.
    pub fn compile_rules(&self) -> Result<Vec<PolicyRule>, PolicyError> {
        self.rules
            .iter()
            .enumerate()
            .map(|(index, entry)| entry.compile(index))
            .collect()
    }

    pub fn into_engine(self) -> Result<PolicyEngine, PolicyError> {
        let rules = self.compile_rules()?;
        Ok(PolicyEngine::with_default(rules, self.default))
    }
}

/// Read a policy file and build an engine from it.
pub fn load_policy_file(path: impl AsRef<Path>) -> Result<PolicyEngine, PolicyError> {
    PolicyConfig::load(path)?.into_engine()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ToolCall;
    use serde_json::json;
    use std::io::Write;

    fn shell(command: &str) -> ToolCall {
        ToolCall::new("run_shell_command", json!({ "command": command }))
    }

    #[test]
    fn compiles_ordered_rules_from_toml() {
        let raw = r#"
            default = "ask_user"

            [[rules]]
            tool = "run_shell_command"
            prefix = "rm -rf"
            decision = "deny"

            [[rules]]
            tool = "run_shell_command"
            prefix = "git status"
            decision = "allow"

            [[rules]]
            tool = "read_file"
            decision = "allow"
        "#;
        let engine = PolicyConfig::from_toml_str(raw)
            .unwrap()
            .into_engine()
            .unwrap();

        assert_eq!(engine.check(&shell("rm -rf /tmp")), PolicyDecision::Deny);
        assert_eq!(engine.check(&shell("git status")), PolicyDecision::Allow);
        assert_eq!(
            engine.check(&ToolCall::new("read_file", json!({ "path": "x" }))),
            PolicyDecision::Allow
        );
        assert_eq!(engine.check(&shell("ls")), PolicyDecision::AskUser);
    }

    #[test]
    fn default_section_is_optional() {
        let config = PolicyConfig::from_toml_str("").unwrap();
        assert_eq!(config.default, PolicyDecision::AskUser);
        assert!(config.rules.is_empty());
    }

    #[test]
    fn custom_default_decision() {
        let engine = PolicyConfig::from_toml_str(r#"default = "deny""#)
            .unwrap()
            .into_engine()
            .unwrap();
        assert_eq!(engine.check(&shell("ls")), PolicyDecision::Deny);
    }

    #[test]
    fn prefix_without_tool_is_rejected() {
        let raw = r#"
            [[rules]]
            prefix = "rm"
            decision = "deny"
        "#;
        let err = PolicyConfig::from_toml_str(raw)
            .unwrap()
            .compile_rules()
            .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidRule(_)));
    }

    #[test]
    fn prefix_and_args_pattern_are_mutually_exclusive() {
        let raw = r#"
            [[rules]]
            tool = "run_shell_command"
            prefix = "rm"
            args_pattern = "force"
            decision = "deny"
        "#;
        let err = PolicyConfig::from_toml_str(raw)
            .unwrap()
            .compile_rules()
            .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidRule(_)));
    }

    #[test]
    fn bad_regex_fails_at_load_time() {
        let raw = r#"
            [[rules]]
            args_pattern = "("
            decision = "deny"
        "#;
        let err = PolicyConfig::from_toml_str(raw)
            .unwrap()
            .compile_rules()
            .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidRule(_)));
    }

    #[test]
    fn missing_decision_is_rejected() {
        let raw = r#"
            [[rules]]
            tool = "read_file"
        "#;
        let err = PolicyConfig::from_toml_str(raw)
            .unwrap()
            .compile_rules()
            .unwrap_err();
        assert!(matches!(err, PolicyError::InvalidRule(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            default = "ask_user"

            [[rules]]
            tool = "glob"
            decision = "allow"
            "#
        )
        .unwrap();

        let engine = load_policy_file(file.path()).unwrap();
        assert_eq!(
            engine.check(&ToolCall::new("glob", json!({ "pattern": "*" }))),
            PolicyDecision::Allow
        );
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = PolicyConfig::from_toml_str("rules = 3").unwrap_err();
        assert!(matches!(err, PolicyError::Parse(_)));
    }
}
