//! Strategy chain execution.

use std::sync::Arc;
use std::time::Instant;

use crate::config::{ModelCatalog, RouterTuning};
use crate::model::SharedModelClient;
use crate::session::SharedSessionState;
use crate::telemetry::{NoopTelemetry, SharedTelemetry, TelemetryEvent};

use super::classifier::ClassifierStrategy;
use super::context::RoutingContext;
use super::decision::{RouteSource, RoutingDecision};
use super::strategy::{DefaultStrategy, FallbackStrategy, OverrideStrategy, RouteStrategy};

const LOG_TARGET: &str = "governance.router";

/// Shared handle to a [`ModelRouter`].
pub type SharedModelRouter = Arc<ModelRouter>;

/// Walks the strategy chain and always produces a decision.
///
/// `route` cannot fail: strategy errors are absorbed, logged, and noted on
/// the eventual decision's metadata while the chain falls through to the
/// next rung. Two short circuits run before the chain, in order: a caller
/// pin (`forced_model`), then turn-type continuity.
pub struct ModelRouter {
    strategies: Vec<RouteStrategy>,
    session: SharedSessionState,
    default_model: String,
    telemetry: SharedTelemetry,
}

impl ModelRouter {
    /// The production chain: fallback, override, classifier, default.
    pub fn standard(
        client: SharedModelClient,
        catalog: &ModelCatalog,
        tuning: RouterTuning,
        session: SharedSessionState,
    ) -> Self {
        let strategies = vec![
            RouteStrategy::Fallback(FallbackStrategy::new(&catalog.fallback)),
            RouteStrategy::Override(OverrideStrategy),
            RouteStrategy::Classifier(ClassifierStrategy::new(client, catalog.clone(), tuning)),
            RouteStrategy::Default(DefaultStrategy::new(&catalog.primary)),
        ];
        Self::new(strategies, session, &catalog.primary)
    }

    pub fn new(
        strategies: Vec<RouteStrategy>,
        session: SharedSessionState,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            strategies,
            session,
            default_model: default_model.into(),
            telemetry: Arc::new(NoopTelemetry),
        }
    }

    pub fn with_telemetry(mut self, telemetry: SharedTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn shared(self) -> SharedModelRouter {
        Arc::new(self)
    }

    /// Choose the model for this prompt. Infallible.
    pub async fn route(&self, context: &RoutingContext) -> RoutingDecision {
        let started = Instant::now();

        if let Some(forced) = &context.forced_model {
            let decision = RoutingDecision::new(forced, RouteSource::Forced)
                .with_reasoning("model pinned by caller");
            return self.finish(context, decision, started, None);
        }

        if context.turn_type.bypasses_routing() {
            let decision =
                RoutingDecision::new(self.session.current_model(), RouteSource::Continuity)
                    .with_reasoning(format!("{} turn stays on the current model", context.turn_type));
            return self.finish(context, decision, started, None);
        }

        let mut absorbed: Option<String> = None;
        for strategy in &self.strategies {
            match strategy.evaluate(context, &self.session).await {
                Ok(Some(decision)) => return self.finish(context, decision, started, absorbed),
                Ok(None) => continue,
                Err(error) => {
                    tracing::warn!(
                        target: LOG_TARGET,
                        prompt_id = %context.prompt_id,
                        strategy = strategy.name(),
                        error = %error,
                        "routing strategy failed, falling through"
                    );
                    absorbed = Some(format!("{}: {error}", strategy.name()));
                }
            }
        }

        // Reachable only with a custom chain missing a terminal rung.
        let decision = RoutingDecision::new(&self.default_model, RouteSource::Default)
            .with_reasoning("no strategy decided");
        self.finish(context, decision, started, absorbed)
    }

    fn finish(
        &self,
        context: &RoutingContext,
        mut decision: RoutingDecision,
        started: Instant,
        absorbed: Option<String>,
    ) -> RoutingDecision {
        decision.metadata.latency_ms = started.elapsed().as_millis() as u64;
        if decision.metadata.error.is_none() {
            decision.metadata.error = absorbed;
        }
        self.session.set_current_model(&decision.model);

        tracing::info!(
            target: LOG_TARGET,
            prompt_id = %context.prompt_id,
            model = %decision.model,
            source = %decision.metadata.source,
            latency_ms = decision.metadata.latency_ms,
            "routing decided"
        );
        self.telemetry.record(TelemetryEvent::routing_decided(
            &context.prompt_id,
            &decision.model,
            decision.metadata.source.as_str(),
            decision.metadata.latency_ms,
            decision.metadata.reasoning.clone(),
            decision.metadata.error.clone(),
        ));
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelClient, ModelRequest, ModelResponse, Part};
    use crate::resilience::ApiError;
    use crate::router::TurnType;
    use crate::session::{AuthType, SessionState};
    use crate::telemetry::testing::CapturingTelemetry;
    use async_trait::async_trait;

    struct VerdictClient(&'static str);

    #[async_trait]
    impl ModelClient for VerdictClient {
        async fn generate(&self, _request: ModelRequest) -> Result<ModelResponse, ApiError> {
            Ok(ModelResponse::from_parts(vec![Part::text(self.0)]))
        }
    }

    struct BrokenClient;

    #[async_trait]
    impl ModelClient for BrokenClient {
        async fn generate(&self, _request: ModelRequest) -> Result<ModelResponse, ApiError> {
            Err(ApiError::http(503, "classifier backend down"))
        }
    }

    fn session() -> SharedSessionState {
        SessionState::new(AuthType::OauthPersonal, "gemini-2.5-pro").shared()
    }

    fn router_with(client: impl ModelClient + 'static, session: SharedSessionState) -> ModelRouter {
        ModelRouter::standard(
            Arc::new(client),
            &ModelCatalog::default(),
            RouterTuning::default(),
            session,
        )
    }

    #[tokio::test]
    async fn forced_model_wins_over_everything() {
        let session = session();
        session.enter_fallback_mode();
        session.set_model_override(Some("gemini-2.5-flash".into()));
        let router = router_with(VerdictClient(r#"{"tier": "reasoning"}"#), Arc::clone(&session));

        let context = RoutingContext::new("p-1", "anything").with_forced_model("pinned-model");
        let decision = router.route(&context).await;
        assert_eq!(decision.model, "pinned-model");
        assert_eq!(decision.metadata.source, RouteSource::Forced);
        assert_eq!(session.current_model(), "pinned-model");
    }

    #[tokio::test]
    async fn continuation_turns_reuse_the_current_model() {
        let session = session();
        session.set_current_model("mid-turn-model");
        let router = router_with(VerdictClient(r#"{"tier": "fast"}"#), Arc::clone(&session));

        let context = RoutingContext::new("p-2", "tool results")
            .with_turn_type(TurnType::ToolResponseContinuation);
        let decision = router.route(&context).await;
        assert_eq!(decision.model, "mid-turn-model");
        assert_eq!(decision.metadata.source, RouteSource::Continuity);
    }

    #[tokio::test]
    async fn classifier_failure_falls_through_to_default_with_note() {
        let session = session();
        let telemetry = Arc::new(CapturingTelemetry::default());
        let router = router_with(BrokenClient, Arc::clone(&session))
            .with_telemetry(Arc::clone(&telemetry) as SharedTelemetry);

        let context = RoutingContext::new("p-3", "hello");
        let decision = router.route(&context).await;
        assert_eq!(decision.model, ModelCatalog::default().primary);
        assert_eq!(decision.metadata.source, RouteSource::Default);
        let note = decision.metadata.error.unwrap();
        assert!(note.contains("classifier"), "missing provenance: {note}");
        assert_eq!(telemetry.count_of("routing_decided"), 1);
    }

    #[tokio::test]
    async fn fallback_mode_outranks_override_and_classifier() {
        let session = session();
        session.enter_fallback_mode();
        session.set_model_override(Some("user-picked".into()));
        let router = router_with(VerdictClient(r#"{"tier": "reasoning"}"#), Arc::clone(&session));

        let decision = router.route(&RoutingContext::new("p-4", "hello")).await;
        assert_eq!(decision.model, ModelCatalog::default().fallback);
        assert_eq!(decision.metadata.source, RouteSource::Fallback);
    }

    #[tokio::test]
    async fn empty_chain_still_decides() {
        let session = session();
        let router = ModelRouter::new(Vec::new(), Arc::clone(&session), "last-resort");

        let decision = router.route(&RoutingContext::new("p-5", "hello")).await;
        assert_eq!(decision.model, "last-resort");
        assert_eq!(decision.metadata.source, RouteSource::Default);
    }
}
