//! Failure modes of a sub-agent scope.

use governance::ApiError;

/// Errors surfaced to the caller of a scope.
///
/// Tool-level problems never appear here: a failed or rejected tool call is
/// reported back to the model as a function response so it can adapt. Only
/// failures that end the scope itself use this type.
#[derive(Debug, thiserror::Error)]
pub enum SubAgentError {
    #[error("prompt template references undefined variable '{name}'")]
    MissingTemplateVar { name: String },

    #[error("scope configuration invalid: {0}")]
    InvalidConfig(String),

    #[error("model call failed: {0}")]
    Model(#[from] ApiError),

    #[error("scope did not emit required output '{output}'")]
    ContractViolation { output: String },

    #[error("scope cancelled")]
    Cancelled,
}
