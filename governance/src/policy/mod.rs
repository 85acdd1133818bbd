//! Deterministic tool-call authorization.
//!
//! Every proposed tool call is checked against an ordered rule list before
//! anything executes. Evaluation is synchronous and first-match-wins:
//!
//! | Piece          | Role                                                |
//! |----------------|-----------------------------------------------------|
//! | [`PolicyRule`] | matcher plus decision, evaluated in list order      |
//! | [`PolicyEngine`] | holds the rules, answers `check()` with no side effects |
//! | [`PolicyConfig`] | TOML shape compiled into rules at load time       |
//! | [`ApprovalMode`] | coarse presets appended after explicit rules      |
//!
//! The engine never asks anyone anything. `AskUser` is a value returned to
//! the caller; the confirmation conversation happens on the message bus.

mod engine;
mod loader;
mod rule;

pub use engine::{PolicyEngine, PolicyProvider, SharedPolicyEngine};
pub use loader::{load_policy_file, PolicyConfig, RuleEntry};
pub use rule::{ApprovalMode, PolicyDecision, PolicyRule, RuleMatcher, EDIT_TOOLS};

/// Failures while loading or evaluating policy.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse policy file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid policy rule: {0}")]
    InvalidRule(String),

    #[error("policy evaluation failed: {0}")]
    Evaluation(String),
}
