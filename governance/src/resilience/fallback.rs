//! Model fallback after terminal quota errors.
//!
//! When the active model's quota is exhausted for the session, the retry
//! loop consults a [`FallbackHandler`]. The [`FallbackCoordinator`] is the
//! standard implementation: it gates on auth type and model identity, asks a
//! [`FallbackDecider`] what to do, and flips the session's fallback flag at
//! most once.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::session::{AuthType, SharedSessionState};
use crate::telemetry::{NoopTelemetry, SharedTelemetry, TelemetryEvent};

use super::classifier::ApiError;

const LOG_TARGET: &str = "governance.fallback";

/// What the agent should do after a terminal quota error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackIntent {
    /// Switch to the fallback model and retry with a fresh budget.
    Retry,
    /// Give up on the current prompt.
    Stop,
    /// Give up and direct the user to re-authenticate.
    Auth,
}

impl FallbackIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackIntent::Retry => "retry",
            FallbackIntent::Stop => "stop",
            FallbackIntent::Auth => "auth",
        }
    }
}

impl fmt::Display for FallbackIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Hook consulted by [`retry_with_backoff`](super::retry_with_backoff) when
/// an error classifies as terminal quota.
///
/// `Ok(Some(Retry))` resets the retry budget; every other outcome makes the
/// loop propagate the original error.
#[async_trait]
pub trait FallbackHandler: Send + Sync {
    async fn on_terminal_quota(&self, error: &ApiError)
        -> anyhow::Result<Option<FallbackIntent>>;
}

/// Application-side choice for a proposed model switch, typically a UI
/// prompt. Failures propagate the original API error.
#[async_trait]
pub trait FallbackDecider: Send + Sync {
    async fn decide(
        &self,
        failed_model: &str,
        fallback_model: &str,
        error: &ApiError,
    ) -> anyhow::Result<FallbackIntent>;
}

/// Decider that accepts every proposed switch. Used where no UI is attached,
/// sub-agent scopes for instance never prompt.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptFallback;

#[async_trait]
impl FallbackDecider for AcceptFallback {
    async fn decide(
        &self,
        _failed_model: &str,
        _fallback_model: &str,
        _error: &ApiError,
    ) -> anyhow::Result<FallbackIntent> {
        Ok(FallbackIntent::Retry)
    }
}

/// Standard fallback glue between retry loop, session state, and UI.
///
/// Gates, in order:
/// 1. only OAuth-personal sessions fall back; other auth types have no
///    plan tier beneath them,
/// 2. a session already running the fallback model has nowhere to go.
///
/// Passing both gates defers to the decider. A `Retry` intent switches the
/// session model; the fallback flag, log line, and telemetry event fire only
/// on the first transition.
pub struct FallbackCoordinator {
    session: SharedSessionState,
    fallback_model: String,
    decider: Arc<dyn FallbackDecider>,
    telemetry: SharedTelemetry,
}

impl FallbackCoordinator {
    pub fn new(session: SharedSessionState, fallback_model: impl Into<String>) -> Self {
        Self {
            session,
            fallback_model: fallback_model.into(),
            decider: Arc::new(AcceptFallback),
            telemetry: Arc::new(NoopTelemetry),
        }
    }

    pub fn with_decider(mut self, decider: Arc<dyn FallbackDecider>) -> Self {
        self.decider = decider;
        self
    }

    pub fn with_telemetry(mut self, telemetry: SharedTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn fallback_model(&self) -> &str {
        &self.fallback_model
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl FallbackHandler for FallbackCoordinator {
    async fn on_terminal_quota(
        &self,
        error: &ApiError,
    ) -> anyhow::Result<Option<FallbackIntent>> {
        if self.session.auth_type() != AuthType::OauthPersonal {
            return Ok(None);
        }

        let failed_model = self.session.current_model();
        if failed_model == self.fallback_model {
            tracing::debug!(
                target: LOG_TARGET,
                model = %failed_model,
                "already on the fallback model, nothing to switch to"
            );
            return Ok(None);
        }

        let intent = self
            .decider
            .decide(&failed_model, &self.fallback_model, error)
            .await?;

        if intent == FallbackIntent::Retry {
            self.session.set_current_model(&self.fallback_model);
            if self.session.enter_fallback_mode() {
                tracing::warn!(
                    target: LOG_TARGET,
                    failed_model = %failed_model,
                    fallback_model = %self.fallback_model,
                    "switching to fallback model for the rest of the session"
                );
                self.telemetry.record(TelemetryEvent::fallback_entered(
                    &failed_model,
                    &self.fallback_model,
                    intent.as_str(),
                ));
            }
        }

        Ok(Some(intent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use crate::telemetry::testing::CapturingTelemetry;

    fn terminal_error() -> ApiError {
        ApiError::http(429, "Quota exceeded: requests per day")
    }

    struct ScriptedDecider(FallbackIntent);

    #[async_trait]
    impl FallbackDecider for ScriptedDecider {
        async fn decide(
            &self,
            _failed_model: &str,
            _fallback_model: &str,
            _error: &ApiError,
        ) -> anyhow::Result<FallbackIntent> {
            Ok(self.0)
        }
    }

    struct FailingDecider;

    #[async_trait]
    impl FallbackDecider for FailingDecider {
        async fn decide(
            &self,
            _failed_model: &str,
            _fallback_model: &str,
            _error: &ApiError,
        ) -> anyhow::Result<FallbackIntent> {
            anyhow::bail!("ui went away")
        }
    }

    #[tokio::test]
    async fn non_oauth_sessions_never_fall_back() {
        let session = SessionState::new(AuthType::ApiKey, "gemini-2.5-pro").shared();
        let coordinator = FallbackCoordinator::new(Arc::clone(&session), "gemini-2.5-flash");

        let outcome = coordinator.on_terminal_quota(&terminal_error()).await.unwrap();
        assert_eq!(outcome, None);
        assert!(!session.fallback_active());
    }

    #[tokio::test]
    async fn already_on_fallback_model_yields_none() {
        let session = SessionState::new(AuthType::OauthPersonal, "gemini-2.5-flash").shared();
        let coordinator = FallbackCoordinator::new(Arc::clone(&session), "gemini-2.5-flash");

        let outcome = coordinator.on_terminal_quota(&terminal_error()).await.unwrap();
        assert_eq!(outcome, None);
        assert!(!session.fallback_active());
    }

    #[tokio::test]
    async fn retry_intent_switches_model_and_flags_session_once() {
        let session = SessionState::new(AuthType::OauthPersonal, "gemini-2.5-pro").shared();
        let telemetry = Arc::new(CapturingTelemetry::default());
        let coordinator = FallbackCoordinator::new(Arc::clone(&session), "gemini-2.5-flash")
            .with_telemetry(Arc::clone(&telemetry) as SharedTelemetry);

        let outcome = coordinator.on_terminal_quota(&terminal_error()).await.unwrap();
        assert_eq!(outcome, Some(FallbackIntent::Retry));
        assert!(session.fallback_active());
        assert_eq!(session.current_model(), "gemini-2.5-flash");
        assert_eq!(telemetry.count_of("fallback_entered"), 1);

        // A second consult hits the same-model gate and records nothing new.
        let outcome = coordinator.on_terminal_quota(&terminal_error()).await.unwrap();
        assert_eq!(outcome, None);
        assert_eq!(telemetry.count_of("fallback_entered"), 1);
    }

    #[tokio::test]
    async fn stop_intent_leaves_session_untouched() {
        let session = SessionState::new(AuthType::OauthPersonal, "gemini-2.5-pro").shared();
        let telemetry = Arc::new(CapturingTelemetry::default());
        let coordinator = FallbackCoordinator::new(Arc::clone(&session), "gemini-2.5-flash")
            .with_decider(Arc::new(ScriptedDecider(FallbackIntent::Stop)))
            .with_telemetry(Arc::clone(&telemetry) as SharedTelemetry);

        let outcome = coordinator.on_terminal_quota(&terminal_error()).await.unwrap();
        assert_eq!(outcome, Some(FallbackIntent::Stop));
        assert!(!session.fallback_active());
        assert_eq!(session.current_model(), "gemini-2.5-pro");
        assert!(telemetry.events().is_empty());
    }

    #[tokio::test]
    async fn decider_failure_propagates() {
        let session = SessionState::new(AuthType::OauthPersonal, "gemini-2.5-pro").shared();
        let coordinator = FallbackCoordinator::new(Arc::clone(&session), "gemini-2.5-flash")
            .with_decider(Arc::new(FailingDecider));

        let result = coordinator.on_terminal_quota(&terminal_error()).await;
        assert!(result.is_err());
        assert!(!session.fallback_active());
    }
}
