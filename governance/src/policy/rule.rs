//! Policy decisions, rule matchers, and approval-mode presets.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::messages::ToolCall;

/// Tools that approval modes may pre-approve for file edits.
pub const EDIT_TOOLS: &[&str] = &["write_file", "replace"];

/// Verdict for a single tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDecision {
    /// Execute without asking.
    Allow,
    /// Refuse without asking.
    Deny,
    /// Defer to interactive confirmation.
    AskUser,
}

impl fmt::Display for PolicyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PolicyDecision::Allow => "allow",
            PolicyDecision::Deny => "deny",
            PolicyDecision::AskUser => "ask_user",
        };
        write!(f, "{label}")
    }
}

/// Predicate deciding whether a rule applies to a tool call.
#[derive(Debug, Clone)]
pub enum RuleMatcher {
    /// Matches every call. Used for catch-all rules.
    Any,
    /// Matches calls to the named tool.
    ToolName(String),
    /// Matches shell-style calls whose command starts with `prefix` on a
    /// token boundary: `git commit` covers `git commit -m x` but not
    /// `git commitsomething`.
    ShellPrefix { tool: String, prefix: String },
    /// Matches when the serialized arguments satisfy a regex, optionally
    /// scoped to one tool.
    ArgsPattern {
        tool: Option<String>,
        pattern: Regex,
    },
}

impl RuleMatcher {
    pub fn matches(&self, call: &ToolCall) -> bool {
        match self {
            RuleMatcher::Any => true,
            RuleMatcher::ToolName(name) => call.name == *name,
            RuleMatcher::ShellPrefix { tool, prefix } => {
                if call.name != *tool {
                    return false;
                }
                match call.shell_command() {
                    Some(command) => command_has_prefix(command, prefix),
                    None => false,
                }
            }
            RuleMatcher::ArgsPattern { tool, pattern } => {
                if let Some(tool) = tool {
                    if call.name != *tool {
                        return false;
                    }
                }
                pattern.is_match(&call.args.to_string())
            }
        }
    }
}

/// True when `command` begins with every token of `prefix`, compared after
/// shell-aware splitting. Unparseable input never matches.
pub(crate) fn command_has_prefix(command: &str, prefix: &str) -> bool {
    let Some(prefix_tokens) = shlex::split(prefix) else {
        return false;
    };
    let Some(command_tokens) = shlex::split(command) else {
        return false;
    };
    if prefix_tokens.is_empty() || prefix_tokens.len() > command_tokens.len() {
        return false;
    }
    command_tokens[..prefix_tokens.len()] == prefix_tokens[..]
}

/// One ordered entry in a policy rule set.
#[derive(Debug, Clone)]
pub struct PolicyRule {
    pub matcher: RuleMatcher,
    pub decision: PolicyDecision,
}

impl PolicyRule {
    pub fn new(matcher: RuleMatcher, decision: PolicyDecision) -> Self {
        Self { matcher, decision }
    }

    pub fn allow(matcher: RuleMatcher) -> Self {
        Self::new(matcher, PolicyDecision::Allow)
    }

    pub fn deny(matcher: RuleMatcher) -> Self {
        Self::new(matcher, PolicyDecision::Deny)
    }

    pub fn ask(matcher: RuleMatcher) -> Self {
        Self::new(matcher, PolicyDecision::AskUser)
    }
}

/// Coarse approval presets layered under explicit rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Everything not covered by a rule goes to confirmation.
    #[default]
    Default,
    /// File edits run without asking.
    AutoEdit,
    /// Every call runs without asking.
    Yolo,
}

impl ApprovalMode {
    /// Rules the mode contributes, evaluated after user-supplied rules.
    pub fn preset_rules(self) -> Vec<PolicyRule> {
        match self {
            ApprovalMode::Default => Vec::new(),
            ApprovalMode::AutoEdit => EDIT_TOOLS
                .iter()
                .map(|tool| PolicyRule::allow(RuleMatcher::ToolName((*tool).to_string())))
                .collect(),
            ApprovalMode::Yolo => vec![PolicyRule::allow(RuleMatcher::Any)],
        }
    }
}

impl fmt::Display for ApprovalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ApprovalMode::Default => "default",
            ApprovalMode::AutoEdit => "auto_edit",
            ApprovalMode::Yolo => "yolo",
        };
        write!(f, "{label}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shell(command: &str) -> ToolCall {
        ToolCall::new("run_shell_command", json!({ "command": command }))
    }

    #[test]
    fn prefix_respects_token_boundaries() {
        assert!(command_has_prefix("git commit -m 'x'", "git commit"));
        assert!(command_has_prefix("git commit", "git commit"));
        assert!(!command_has_prefix("git commitsomething", "git commit"));
        assert!(!command_has_prefix("git", "git commit"));
    }

    #[test]
    fn prefix_handles_quoted_tokens() {
        assert!(command_has_prefix("git commit -m \"fix: thing\"", "git commit"));
        // Dangling quote fails to parse and must not match.
        assert!(!command_has_prefix("git commit \"unterminated", "git commit"));
    }

    #[test]
    fn empty_prefix_never_matches() {
        assert!(!command_has_prefix("anything at all", ""));
    }

    #[test]
    fn shell_prefix_matcher_checks_tool_name() {
        let matcher = RuleMatcher::ShellPrefix {
            tool: "run_shell_command".into(),
            prefix: "rm -rf".into(),
        };
        assert!(matcher.matches(&shell("rm -rf /tmp/scratch")));
        assert!(!matcher.matches(&shell("rm important.txt")));
        assert!(!matcher.matches(&ToolCall::new(
            "other_tool",
            json!({ "command": "rm -rf /" })
        )));
        // Shell matcher without a command argument cannot apply.
        assert!(!matcher.matches(&ToolCall::new("run_shell_command", json!({}))));
    }

    #[test]
    fn args_pattern_matcher_scopes_by_tool() {
        let scoped = RuleMatcher::ArgsPattern {
            tool: Some("write_file".into()),
            pattern: Regex::new(r"\.env").unwrap(),
        };
        assert!(scoped.matches(&ToolCall::new(
            "write_file",
            json!({ "path": "config/.env" })
        )));
        assert!(!scoped.matches(&ToolCall::new(
            "read_file",
            json!({ "path": "config/.env" })
        )));

        let unscoped = RuleMatcher::ArgsPattern {
            tool: None,
            pattern: Regex::new(r"secret").unwrap(),
        };
        assert!(unscoped.matches(&ToolCall::new("read_file", json!({ "path": "secret" }))));
    }

    #[test]
    fn approval_mode_presets() {
        assert!(ApprovalMode::Default.preset_rules().is_empty());

        let auto_edit = ApprovalMode::AutoEdit.preset_rules();
        assert_eq!(auto_edit.len(), EDIT_TOOLS.len());
        assert!(auto_edit
            .iter()
            .all(|rule| rule.decision == PolicyDecision::Allow));

        let yolo = ApprovalMode::Yolo.preset_rules();
        assert_eq!(yolo.len(), 1);
        assert!(matches!(yolo[0].matcher, RuleMatcher::Any));
    }

    #[test]
    fn decision_display_is_snake_case() {
        assert_eq!(PolicyDecision::AskUser.to_string(), "ask_user");
        assert_eq!(ApprovalMode::AutoEdit.to_string(), "auto_edit");
    }
}
