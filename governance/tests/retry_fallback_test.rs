//! Resilience suite: retry loop glued to the real fallback coordinator.
//!
//! Unit tests cover the loop and the coordinator in isolation; this suite
//! checks the contract between them plus the session state they share.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use governance::{
    retry_with_backoff, ApiError, AuthType, FallbackCoordinator, FallbackDecider, FallbackHandler,
    FallbackIntent, ModelResponse, Part, RetryOptions, SessionState, SharedSessionState,
    TelemetryEvent, TelemetrySink,
};

// ── Fixtures ─────────────────────────────────────────────────────────────────

type Script = Arc<Mutex<VecDeque<Result<ModelResponse, ApiError>>>>;

fn scripted(
    results: Vec<Result<ModelResponse, ApiError>>,
) -> (Script, Arc<AtomicU32>) {
    (
        Arc::new(Mutex::new(VecDeque::from(results))),
        Arc::new(AtomicU32::new(0)),
    )
}

fn operation(
    script: &Script,
    calls: &Arc<AtomicU32>,
) -> impl FnMut() -> Pin<Box<dyn Future<Output = Result<ModelResponse, ApiError>> + Send>> {
    let script = Arc::clone(script);
    let calls = Arc::clone(calls);
    move || {
        let script = Arc::clone(&script);
        let calls = Arc::clone(&calls);
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::http(503, "script exhausted")))
        })
    }
}

fn text_response(text: &str) -> ModelResponse {
    ModelResponse::from_parts(vec![Part::text(text)])
}

fn daily_quota() -> ApiError {
    ApiError::http(429, "Quota exceeded for quota metric: requests per day")
}

fn oauth_session() -> SharedSessionState {
    SessionState::new(AuthType::OauthPersonal, "gemini-2.5-pro").shared()
}

fn fast_options() -> RetryOptions<ModelResponse> {
    RetryOptions::new()
        .with_initial_delay(Duration::from_millis(10))
        .with_max_delay(Duration::from_millis(80))
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingSink {
    fn count_of(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.event_type() == event_type)
            .count()
    }
}

impl TelemetrySink for RecordingSink {
    fn record(&self, event: TelemetryEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ── Attempt accounting ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn budget_of_three_means_exactly_three_calls() {
    let (script, calls) = scripted(vec![]);
    let options = fast_options().with_max_attempts(3);

    let result = retry_with_backoff(operation(&script, &calls), options).await;
    match result.unwrap_err() {
        ApiError::RetryExhausted { attempts, .. } => assert_eq!(attempts, 3),
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn bad_requests_are_never_retried() {
    let (script, calls) = scripted(vec![Err(ApiError::http(400, "malformed tool schema"))]);
    let result = retry_with_backoff(operation(&script, &calls), fast_options()).await;

    assert!(matches!(
        result.unwrap_err(),
        ApiError::Http { status: 400, .. }
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ── Fallback glue ────────────────────────────────────────────────────────────

#[tokio::test]
async fn accepted_fallback_switches_model_and_finishes_the_request() {
    let session = oauth_session();
    let sink = Arc::new(RecordingSink::default());
    let coordinator = FallbackCoordinator::new(Arc::clone(&session), "gemini-2.5-flash")
        .with_telemetry(Arc::clone(&sink) as Arc<dyn TelemetrySink>)
        .shared();

    let (script, calls) = scripted(vec![Err(daily_quota()), Ok(text_response("recovered"))]);
    let options = fast_options()
        .with_max_attempts(1)
        .with_fallback(coordinator as Arc<dyn FallbackHandler>);

    let response = retry_with_backoff(operation(&script, &calls), options)
        .await
        .unwrap();
    assert_eq!(response.text(), "recovered");
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    assert!(session.fallback_active());
    assert_eq!(session.current_model(), "gemini-2.5-flash");
    assert_eq!(sink.count_of("fallback_entered"), 1);
}

#[tokio::test]
async fn second_quota_hit_after_fallback_propagates() {
    let session = oauth_session();
    let coordinator =
        FallbackCoordinator::new(Arc::clone(&session), "gemini-2.5-flash").shared();

    // First quota hit switches; the second happens while already on the
    // fallback model, so there is nowhere left to go.
    let (script, calls) = scripted(vec![Err(daily_quota()), Err(daily_quota())]);
    let options = fast_options()
        .with_max_attempts(1)
        .with_fallback(coordinator as Arc<dyn FallbackHandler>);

    let result = retry_with_backoff(operation(&script, &calls), options).await;
    assert!(matches!(
        result.unwrap_err(),
        ApiError::Http { status: 429, .. }
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(session.fallback_active());
}

#[tokio::test]
async fn api_key_sessions_fail_fast_on_terminal_quota() {
    let session = SessionState::new(AuthType::ApiKey, "gemini-2.5-pro").shared();
    let coordinator =
        FallbackCoordinator::new(Arc::clone(&session), "gemini-2.5-flash").shared();

    let (script, calls) = scripted(vec![Err(daily_quota())]);
    let options = fast_options().with_fallback(coordinator as Arc<dyn FallbackHandler>);

    let result = retry_with_backoff(operation(&script, &calls), options).await;
    assert!(matches!(
        result.unwrap_err(),
        ApiError::Http { status: 429, .. }
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!session.fallback_active());
    assert_eq!(session.current_model(), "gemini-2.5-pro");
}

struct DeclineFallback;

#[async_trait]
impl FallbackDecider for DeclineFallback {
    async fn decide(
        &self,
        _failed_model: &str,
        _fallback_model: &str,
        _error: &ApiError,
    ) -> anyhow::Result<FallbackIntent> {
        Ok(FallbackIntent::Stop)
    }
}

#[tokio::test]
async fn declined_fallback_keeps_the_session_on_its_model() {
    let session = oauth_session();
    let coordinator = FallbackCoordinator::new(Arc::clone(&session), "gemini-2.5-flash")
        .with_decider(Arc::new(DeclineFallback))
        .shared();

    let (script, calls) = scripted(vec![Err(daily_quota())]);
    let options = fast_options().with_fallback(coordinator as Arc<dyn FallbackHandler>);

    let result = retry_with_backoff(operation(&script, &calls), options).await;
    assert!(matches!(
        result.unwrap_err(),
        ApiError::Http { status: 429, .. }
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!session.fallback_active());
    assert_eq!(session.current_model(), "gemini-2.5-pro");
}

// ── Server-declared delays ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn server_declared_delay_is_waited_verbatim() {
    let sink = Arc::new(RecordingSink::default());
    let details = serde_json::json!([{ "retryDelay": "7s" }]);
    let (script, calls) = scripted(vec![
        Err(ApiError::http_with_details(429, "throttled", details)),
        Ok(text_response("after the wait")),
    ]);
    let options = RetryOptions::new()
        .with_initial_delay(Duration::from_secs(5))
        .with_max_delay(Duration::from_secs(30))
        .with_telemetry(Arc::clone(&sink) as Arc<dyn TelemetrySink>);

    let started = tokio::time::Instant::now();
    let response = retry_with_backoff(operation(&script, &calls), options)
        .await
        .unwrap();
    assert_eq!(response.text(), "after the wait");
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Paused-clock elapsed time equals the declared delay exactly.
    assert_eq!(started.elapsed(), Duration::from_secs(7));

    let events = sink.events.lock().unwrap();
    match &events[0] {
        TelemetryEvent::RetryWait {
            delay_ms,
            server_declared,
            ..
        } => {
            assert_eq!(*delay_ms, 7_000);
            assert!(server_declared);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

// ── Content-defect retries ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn empty_responses_are_retried_then_surrendered() {
    let empty = || Ok(ModelResponse::from_parts(Vec::new()));
    let (script, calls) = scripted(vec![empty(), empty(), empty()]);
    let options = fast_options()
        .with_max_attempts(3)
        .with_content_check(|response: &ModelResponse| response.is_empty());

    let response = retry_with_backoff(operation(&script, &calls), options)
        .await
        .unwrap();
    assert!(response.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn empty_response_recovers_on_a_later_attempt() {
    let (script, calls) = scripted(vec![
        Ok(ModelResponse::from_parts(Vec::new())),
        Ok(text_response("substance")),
    ]);
    let options = fast_options()
        .with_max_attempts(3)
        .with_content_check(|response: &ModelResponse| response.is_empty());

    let response = retry_with_backoff(operation(&script, &calls), options)
        .await
        .unwrap();
    assert_eq!(response.text(), "substance");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
