//! Bounded, single-purpose sub-agent execution.
//!
//! A sub-agent is a nested agent loop delegated one narrow task: it gets a
//! fixed model, a templated prompt, a read-mostly tool surface, and hard
//! turn and wall-clock budgets. It cannot widen its own permissions: the
//! scope owns a private policy engine and message bus, so every tool call
//! is confirmed the same way the outer agent's calls are.
//!
//! Declared outputs are collected through the reserved `emit_value` tool,
//! which the scope intercepts before it reaches the policy layer. Callers
//! check the contract afterwards with [`SubAgentOutput::require`].
//!
//! ```text
//!   SubAgentScope::create(..)?.run(&state, cancel).await?
//!       -> SubAgentOutput { terminate_mode, emitted_outputs, .. }
//! ```

#![allow(dead_code)]
#![allow(clippy::uninlined_format_args)]

pub mod errors;
pub mod prompt;
pub mod scope;
pub mod tools;
pub mod types;

// Re-export the scope entry points
pub use scope::{SubAgentRuntime, SubAgentScope};

// Re-export configuration and result types
pub use types::{
    ContextState, ModelConfig, OutputConfig, PromptConfig, RunConfig, SubAgentOutput,
    TerminateMode,
};

// Re-export the tool surface
pub use tools::{emit_value_declaration, ToolExecutor, ToolRegistry, EMIT_VALUE_TOOL};

// Re-export errors and templating helpers
pub use errors::SubAgentError;
pub use prompt::{build_system_prompt, render_template};
