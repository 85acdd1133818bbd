//! The strategy chain members.
//!
//! A strategy answers one question: "is this prompt mine to route?"
//! `Ok(None)` hands the prompt to the next rung; `Ok(Some(..))` ends the
//! chain. The set is closed on purpose: routing order and precedence are
//! part of this crate's contract, not an extension point.

use crate::session::SessionState;

use super::classifier::ClassifierStrategy;
use super::context::RoutingContext;
use super::decision::{RouteSource, RoutingDecision, RoutingError};

/// One rung of the routing chain.
pub enum RouteStrategy {
    Fallback(FallbackStrategy),
    Override(OverrideStrategy),
    Classifier(ClassifierStrategy),
    Default(DefaultStrategy),
}

impl RouteStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            RouteStrategy::Fallback(_) => "fallback",
            RouteStrategy::Override(_) => "override",
            RouteStrategy::Classifier(_) => "classifier",
            RouteStrategy::Default(_) => "default",
        }
    }

    pub async fn evaluate(
        &self,
        context: &RoutingContext,
        session: &SessionState,
    ) -> Result<Option<RoutingDecision>, RoutingError> {
        match self {
            RouteStrategy::Fallback(strategy) => Ok(strategy.decide(session)),
            RouteStrategy::Override(strategy) => Ok(strategy.decide(session)),
            RouteStrategy::Classifier(strategy) => strategy.decide(context).await,
            RouteStrategy::Default(strategy) => Ok(Some(strategy.decide())),
        }
    }
}

/// Routes every prompt to the fallback model while the session is in
/// fallback mode. Sits first so quota relief cannot be undone by any later
/// rung.
pub struct FallbackStrategy {
    fallback_model: String,
}

impl FallbackStrategy {
    pub fn new(fallback_model: impl Into<String>) -> Self {
        Self {
            fallback_model: fallback_model.into(),
        }
    }

    fn decide(&self, session: &SessionState) -> Option<RoutingDecision> {
        if !session.fallback_active() {
            return None;
        }
        Some(
            RoutingDecision::new(&self.fallback_model, RouteSource::Fallback)
                .with_reasoning("session is in fallback mode"),
        )
    }
}

/// Honors a session-wide model override set by the user.
#[derive(Debug, Default, Clone, Copy)]
pub struct OverrideStrategy;

impl OverrideStrategy {
    fn decide(&self, session: &SessionState) -> Option<RoutingDecision> {
        session.model_override().map(|model| {
            RoutingDecision::new(model, RouteSource::Override)
                .with_reasoning("session model override")
        })
    }
}

/// Terminal rung: always decides.
pub struct DefaultStrategy {
    default_model: String,
}

impl DefaultStrategy {
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            default_model: default_model.into(),
        }
    }

    fn decide(&self) -> RoutingDecision {
        RoutingDecision::new(&self.default_model, RouteSource::Default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::AuthType;

    #[test]
    fn fallback_strategy_is_quiet_until_the_flag_flips() {
        let session = SessionState::new(AuthType::OauthPersonal, "gemini-2.5-pro");
        let strategy = FallbackStrategy::new("gemini-2.5-flash");

        assert!(strategy.decide(&session).is_none());

        session.enter_fallback_mode();
        let decision = strategy.decide(&session).unwrap();
        assert_eq!(decision.model, "gemini-2.5-flash");
        assert_eq!(decision.metadata.source, RouteSource::Fallback);
    }

    #[test]
    fn override_strategy_reflects_session_override() {
        let session = SessionState::new(AuthType::OauthPersonal, "gemini-2.5-pro");
        let strategy = OverrideStrategy;

        assert!(strategy.decide(&session).is_none());

        session.set_model_override(Some("gemini-2.5-flash".into()));
        let decision = strategy.decide(&session).unwrap();
        assert_eq!(decision.model, "gemini-2.5-flash");
        assert_eq!(decision.metadata.source, RouteSource::Override);

        // The auto sentinel means "no override".
        session.set_model_override(Some("auto".into()));
        assert!(strategy.decide(&session).is_none());
    }

    #[test]
    fn default_strategy_always_answers() {
        let strategy = DefaultStrategy::new("gemini-2.5-pro");
        let decision = strategy.decide();
        assert_eq!(decision.model, "gemini-2.5-pro");
        assert_eq!(decision.metadata.source, RouteSource::Default);
    }
}
