//! Prompt templating and assembly.
//!
//! Scope prompts are written once with `${variable}` placeholders and bound
//! to a [`ContextState`] at run time. Rendering is strict: a placeholder
//! without a value aborts scope creation instead of shipping a prompt with a
//! hole in it.

use std::sync::OnceLock;

use regex::Regex;

use crate::errors::SubAgentError;
use crate::types::{ContextState, OutputConfig};
use crate::tools::EMIT_VALUE_TOOL;

/// Replace every `${name}` placeholder with its context value.
pub fn render_template(template: &str, state: &ContextState) -> Result<String, SubAgentError> {
    static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PLACEHOLDER
        .get_or_init(|| Regex::new(r"\$\{([A-Za-z0-9_]+)\}").ok())
        .as_ref()
        .ok_or_else(|| {
            SubAgentError::InvalidConfig("placeholder pattern failed to compile".into())
        })?;

    let mut rendered = String::with_capacity(template.len());
    let mut cursor = 0;
    for captures in pattern.captures_iter(template) {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let value = state.render_value(name.as_str()).ok_or_else(|| {
            SubAgentError::MissingTemplateVar {
                name: name.as_str().to_string(),
            }
        })?;
        rendered.push_str(&template[cursor..whole.start()]);
        rendered.push_str(&value);
        cursor = whole.end();
    }
    rendered.push_str(&template[cursor..]);
    Ok(rendered)
}

/// Assemble the full system prompt: rendered task, output contract, and the
/// unattended-operation rules every scope gets.
pub fn build_system_prompt(task_prompt: &str, outputs: &OutputConfig) -> String {
    let mut prompt = task_prompt.trim_end().to_string();

    if !outputs.is_empty() {
        prompt.push_str("\n\n## Required outputs\n\n");
        prompt.push_str(
            "Before finishing you must emit each of the following values with the `",
        );
        prompt.push_str(EMIT_VALUE_TOOL);
        prompt.push_str("` tool, one call per value:\n\n");
        for (name, description) in &outputs.expected {
            prompt.push_str(&format!("- `{name}`: {description}\n"));
        }
    }

    prompt.push_str(
        "\n\n## Operating rules\n\n\
         You run unattended. There is no user to ask; never request \
         clarification, act on the information you have. Work step by step \
         using the available tools. When the task is complete",
    );
    if !outputs.is_empty() {
        prompt.push_str(" and every required output has been emitted");
    }
    prompt.push_str(", reply with plain text and no tool calls to finish.");
    prompt
}
