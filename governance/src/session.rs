//! Session-scoped state shared across the governance layer.
//!
//! One [`SessionState`] lives for the duration of a CLI session and is
//! handed out as `Arc`. It records how the user authenticated, which model
//! the conversation is currently on, an optional user-pinned model, and
//! the fallback-mode flag flipped after a terminal quota error.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::config::AUTO_MODEL;

/// How the user authenticated against the model provider.
///
/// Quota fallback is only offered on personal OAuth plans; API-key and
/// service-account callers manage their own quotas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    OauthPersonal,
    ApiKey,
    ServiceAccount,
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AuthType::OauthPersonal => "oauth_personal",
            AuthType::ApiKey => "api_key",
            AuthType::ServiceAccount => "service_account",
        };
        write!(f, "{label}")
    }
}

/// Mutable per-session state.
///
/// All fields are independently synchronized so readers never block each
/// other for long: the fallback flag is an atomic, the model slots are
/// short-lived `RwLock` sections.
#[derive(Debug)]
pub struct SessionState {
    auth_type: AuthType,
    fallback_active: AtomicBool,
    current_model: RwLock<String>,
    model_override: RwLock<Option<String>>,
}

pub type SharedSessionState = Arc<SessionState>;

impl SessionState {
    pub fn new(auth_type: AuthType, initial_model: impl Into<String>) -> Self {
        Self {
            auth_type,
            fallback_active: AtomicBool::new(false),
            current_model: RwLock::new(initial_model.into()),
            model_override: RwLock::new(None),
        }
    }

    /// Wrap into the `Arc` handle the rest of the layer consumes.
    pub fn shared(self) -> SharedSessionState {
        Arc::new(self)
    }

    pub fn auth_type(&self) -> AuthType {
        self.auth_type
    }

    /// Whether the session has switched to the fallback model family.
    pub fn fallback_active(&self) -> bool {
        self.fallback_active.load(Ordering::Acquire)
    }

    /// Flip the fallback flag on. Returns `true` only for the flip that
    /// actually changed the state, so callers can log and report exactly
    /// once.
    pub fn enter_fallback_mode(&self) -> bool {
        !self.fallback_active.swap(true, Ordering::AcqRel)
    }

    /// Clear the fallback flag, e.g. after the user re-authenticates.
    pub fn reset_fallback_mode(&self) {
        self.fallback_active.store(false, Ordering::Release);
    }

    /// The model the conversation is currently on. Continuation turns
    /// reuse this instead of re-routing.
    pub fn current_model(&self) -> String {
        self.current_model
            .read()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    pub fn set_current_model(&self, model: impl Into<String>) {
        if let Ok(mut slot) = self.current_model.write() {
            *slot = model.into();
        }
    }

    /// The user-pinned model, if any. The `auto` sentinel is normalized to
    /// `None` (it means "let the router decide").
    pub fn model_override(&self) -> Option<String> {
        self.model_override
            .read()
            .ok()
            .and_then(|slot| slot.clone())
    }

    pub fn set_model_override(&self, model: Option<String>) {
        let normalized = model.filter(|m| m != AUTO_MODEL && !m.is_empty());
        if let Ok(mut slot) = self.model_override.write() {
            *slot = normalized;
        }
    }
}
