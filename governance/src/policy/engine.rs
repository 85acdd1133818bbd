//! First-match-wins policy evaluation.

use std::sync::{Arc, RwLock};

use crate::messages::ToolCall;

use super::rule::{ApprovalMode, PolicyDecision, PolicyRule};
use super::PolicyError;

/// Shared handle to a [`PolicyEngine`].
pub type SharedPolicyEngine = Arc<PolicyEngine>;

/// Seam between the bus and whatever evaluates policy.
///
/// [`PolicyEngine`] is infallible, but callers must treat a failure as a
/// denial rather than an approval.
pub trait PolicyProvider: Send + Sync {
    fn check(&self, call: &ToolCall) -> Result<PolicyDecision, PolicyError>;
}

/// Ordered rule list with a configurable default decision.
///
/// Evaluation walks the rules in order and returns the decision of the first
/// matcher that applies; when nothing matches, the default wins. Rules can be
/// replaced atomically at runtime, and in-flight evaluations keep the
/// snapshot they started with.
pub struct PolicyEngine {
    rules: RwLock<Arc<Vec<PolicyRule>>>,
    default_decision: PolicyDecision,
}

impl PolicyEngine {
    /// Engine with the conservative `AskUser` default.
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        Self::with_default(rules, PolicyDecision::AskUser)
    }

    pub fn with_default(rules: Vec<PolicyRule>, default_decision: PolicyDecision) -> Self {
        Self {
            rules: RwLock::new(Arc::new(rules)),
            default_decision,
        }
    }

    /// Engine whose rule list is `rules` followed by the mode's presets, so
    /// explicit rules always win over the preset.
    pub fn from_approval_mode(mode: ApprovalMode, mut rules: Vec<PolicyRule>) -> Self {
        rules.extend(mode.preset_rules());
        Self::new(rules)
    }

    /// Evaluate a tool call. Pure: no logging, no publishing, no state.
    pub fn check(&self, call: &ToolCall) -> PolicyDecision {
        let rules = self.snapshot();
        for rule in rules.iter() {
            if rule.matcher.matches(call) {
                return rule.decision;
            }
        }
        self.default_decision
    }

    /// Swap the entire rule set. Evaluations already holding the previous
    /// snapshot finish against it.
    pub fn replace_rules(&self, rules: Vec<PolicyRule>) {
        let mut guard = match self.rules.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::new(rules);
    }

    pub fn default_decision(&self) -> PolicyDecision {
        self.default_decision
    }

    pub fn rule_count(&self) -> usize {
        self.snapshot().len()
    }

    pub fn shared(self) -> SharedPolicyEngine {
        Arc::new(self)
    }

    fn snapshot(&self) -> Arc<Vec<PolicyRule>> {
        match self.rules.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }
}

impl PolicyProvider for PolicyEngine {
    fn check(&self, call: &ToolCall) -> Result<PolicyDecision, PolicyError> {
        Ok(PolicyEngine::check(self, call))
    }
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("rules", &self.rule_count())
            .field("default_decision", &self.default_decision)
            .finish()
    }
}
