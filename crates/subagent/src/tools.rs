//! The narrowed tool surface a scope exposes to its model.
//!
//! A [`ToolRegistry`] holds the function declarations advertised on every
//! model call; the host supplies a [`ToolExecutor`] that actually runs them.
//! The `emit_value` tool is never in the registry and never reaches the
//! executor: the scope loop intercepts it to collect declared outputs.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use governance::{FunctionDeclaration, ToolCall};

use crate::types::OutputConfig;

/// Name of the intercepted output-collection tool.
pub const EMIT_VALUE_TOOL: &str = "emit_value";

/// Seam to the host's tool implementations.
///
/// Errors returned here are not fatal to the scope: they are serialized into
/// a function response so the model can see the failure and adjust.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, call: &ToolCall) -> anyhow::Result<Value>;
}

// ============================================================================
// Argument shapes for the read-only preset
// ============================================================================

/// Arguments for the `read_file` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ReadFileArgs {
    #[schemars(description = "Absolute path of the file to read")]
    pub path: String,

    #[schemars(description = "Line number to start reading from")]
    pub offset: Option<u32>,

    #[schemars(description = "Maximum number of lines to return")]
    pub limit: Option<u32>,
}

/// Arguments for the `list_directory` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ListDirectoryArgs {
    #[schemars(description = "Absolute path of the directory to list")]
    pub path: String,
}

/// Arguments for the `search_text` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchTextArgs {
    #[schemars(description = "Regular expression to search for")]
    pub pattern: String,

    #[schemars(description = "File or directory to search; defaults to the workspace root")]
    pub path: Option<String>,

    #[schemars(description = "Maximum number of matches to return")]
    pub max_results: Option<u32>,
}

/// Arguments for the `glob` tool.
#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GlobArgs {
    #[schemars(description = "Glob pattern to match file paths against")]
    pub pattern: String,

    #[schemars(description = "Directory to match under; defaults to the workspace root")]
    pub path: Option<String>,
}

fn schema_of<T: schemars::JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| serde_json::json!({"type": "object"}))
}

// ============================================================================
// Registry
// ============================================================================

/// The declarations a scope advertises, minus `emit_value`.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    declarations: Vec<FunctionDeclaration>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspection-only preset: file reads, listings, and searches.
    pub fn read_only() -> Self {
        Self::new()
            .with_tool(FunctionDeclaration {
                name: "read_file".to_string(),
                description: "Read a file from the workspace".to_string(),
                parameters: schema_of::<ReadFileArgs>(),
            })
            .with_tool(FunctionDeclaration {
                name: "list_directory".to_string(),
                description: "List the entries of a workspace directory".to_string(),
                parameters: schema_of::<ListDirectoryArgs>(),
            })
            .with_tool(FunctionDeclaration {
                name: "search_text".to_string(),
                description: "Search file contents with a regular expression".to_string(),
                parameters: schema_of::<SearchTextArgs>(),
            })
            .with_tool(FunctionDeclaration {
                name: "glob".to_string(),
                description: "Find files whose paths match a glob pattern".to_string(),
                parameters: schema_of::<GlobArgs>(),
            })
    }

    pub fn with_tool(mut self, declaration: FunctionDeclaration) -> Self {
        self.declarations.push(declaration);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.declarations.iter().any(|d| d.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.declarations.iter().map(|d| d.name.as_str()).collect()
    }

    pub fn declarations(&self) -> &[FunctionDeclaration] {
        &self.declarations
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

/// Declaration for the intercepted `emit_value` tool, scoped to the outputs
/// this run actually declared.
pub fn emit_value_declaration(outputs: &OutputConfig) -> FunctionDeclaration {
    let names: Vec<&str> = outputs.expected.keys().map(String::as_str).collect();
    FunctionDeclaration {
        name: EMIT_VALUE_TOOL.to_string(),
        description:
            "Record one of the declared outputs of this task. Call once per output, \
             then finish with a plain-text reply."
                .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "name": {
                    "type": "string",
                    "enum": names,
                    "description": "Which declared output this value is for",
                },
                "value": {
                    "description": "The value to record; any JSON shape is accepted",
                },
            },
            "required": ["name", "value"],
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_preset_lists_the_inspection_tools() {
        let registry = ToolRegistry::read_only();
        assert_eq!(
            registry.names(),
            vec!["read_file", "list_directory", "search_text", "glob"]
        );
        assert!(registry.contains("read_file"));
        assert!(!registry.contains("write_file"));
        assert!(!registry.contains(EMIT_VALUE_TOOL));
    }

    #[test]
    fn generated_schemas_carry_required_fields() {
        let registry = ToolRegistry::read_only();
        let read_file = &registry.declarations()[0];
        let required = read_file.parameters["required"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        assert!(required.iter().any(|v| v == "path"));
        assert!(read_file.parameters["properties"]["path"].is_object());
    }

    #[test]
    fn emit_declaration_enumerates_declared_outputs() {
        let outputs = OutputConfig::none()
            .with_output("summary", "what happened")
            .with_output("verdict", "pass or fail");
        let declaration = emit_value_declaration(&outputs);

        assert_eq!(declaration.name, EMIT_VALUE_TOOL);
        let allowed = declaration.parameters["properties"]["name"]["enum"]
            .as_array()
            .cloned()
            .unwrap_or_default();
        assert_eq!(allowed, vec!["summary", "verdict"]);
    }

    #[test]
    fn custom_tools_append_after_presets() {
        let registry = ToolRegistry::read_only().with_tool(FunctionDeclaration {
            name: "run_tests".to_string(),
            description: "Run the project test suite".to_string(),
            parameters: serde_json::json!({"type": "object"}),
        });
        assert_eq!(registry.names().last(), Some(&"run_tests"));
        assert_eq!(registry.declarations().len(), 5);
    }
}
