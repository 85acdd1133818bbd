//! Runtime configuration for the governance layer.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Values in a loaded TOML file
//! 2. Environment variable overrides (e.g. `AGENT_PRIMARY_MODEL`)
//! 3. Built-in defaults
//!
//! ## Model roles
//!
//! | Role       | Used by                          | Default                |
//! |------------|----------------------------------|------------------------|
//! | primary    | DefaultStrategy, reasoning tier  | gemini-2.5-pro         |
//! | fallback   | FallbackStrategy, fast tier      | gemini-2.5-flash       |
//! | classifier | ClassifierStrategy routing call  | gemini-2.5-flash-lite  |

use std::env;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policy::PolicyConfig;

/// Sentinel model name meaning "let the router decide".
///
/// A pinned model equal to this never routes verbatim.
pub const AUTO_MODEL: &str = "auto";

/// Default model for the reasoning tier and the terminal routing default.
const DEFAULT_PRIMARY_MODEL: &str = "gemini-2.5-pro";
/// Default model for the fast tier; also the quota-fallback target.
const DEFAULT_FALLBACK_MODEL: &str = "gemini-2.5-flash";
/// Default model for the routing classifier call.
const DEFAULT_CLASSIFIER_MODEL: &str = "gemini-2.5-flash-lite";

/// Environment-variable names for model role overrides.
const ENV_PRIMARY_MODEL: &str = "AGENT_PRIMARY_MODEL";
const ENV_FALLBACK_MODEL: &str = "AGENT_FALLBACK_MODEL";
const ENV_CLASSIFIER_MODEL: &str = "AGENT_CLASSIFIER_MODEL";

/// Per-role model assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelCatalog {
    /// High-reasoning model; the terminal default for routing.
    pub primary: String,
    /// Cheaper/faster model used in fallback mode and for the fast tier.
    pub fallback: String,
    /// Small model used for the routing classification call.
    pub classifier: String,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self {
            primary: env::var(ENV_PRIMARY_MODEL)
                .unwrap_or_else(|_| DEFAULT_PRIMARY_MODEL.to_string()),
            fallback: env::var(ENV_FALLBACK_MODEL)
                .unwrap_or_else(|_| DEFAULT_FALLBACK_MODEL.to_string()),
            classifier: env::var(ENV_CLASSIFIER_MODEL)
                .unwrap_or_else(|_| DEFAULT_CLASSIFIER_MODEL.to_string()),
        }
    }
}

/// Tuning knobs for the routing strategy chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterTuning {
    /// How many recent non-tool turns the classifier sees.
    pub classifier_history_turns: usize,
    /// Total history length (turns) at which routing is promoted to the
    /// reasoning tier regardless of the classifier's verdict.
    pub long_history_threshold: usize,
    /// Sampling temperature for the classification call.
    pub classifier_temperature: f32,
    /// Output budget for the classification call.
    pub classifier_max_output_tokens: u32,
}

impl Default for RouterTuning {
    fn default() -> Self {
        Self {
            classifier_history_turns: 8,
            long_history_threshold: 24,
            classifier_temperature: 0.0,
            classifier_max_output_tokens: 256,
        }
    }
}

/// Tuning knobs for the retry controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryTuning {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryTuning {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 5_000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryTuning {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Top-level configuration, usually loaded from `governance.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub models: ModelCatalog,
    pub router: RouterTuning,
    pub retry: RetryTuning,
    pub policy: PolicyConfig,
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

impl GovernanceConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}
