//! Cancellable retry with exponential backoff.
//!
//! [`retry_with_backoff`] drives an async operation until it succeeds, runs
//! out of budget, or hits an error that retrying cannot fix. Delays are
//! jittered and doubled up to a cap; a server-declared delay is honored
//! verbatim and leaves the exponential schedule untouched.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::RetryTuning;
use crate::telemetry::{SharedTelemetry, TelemetryEvent};

use super::classifier::{classify, ApiError, ErrorClass};
use super::fallback::{FallbackHandler, FallbackIntent};

const LOG_TARGET: &str = "governance.retry";

/// Jitter spread as a fraction of the scheduled delay.
const JITTER_FACTOR: f64 = 0.3;

/// Pluggable error classification.
pub type ClassifyFn = Arc<dyn Fn(&ApiError) -> ErrorClass + Send + Sync>;

/// Content inspection: `true` marks a successful payload as defective and
/// worth retrying.
pub type ContentCheck<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Knobs for one retry loop.
pub struct RetryOptions<T> {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    cancel: Option<CancellationToken>,
    classify_error: ClassifyFn,
    retry_on_content: Option<ContentCheck<T>>,
    fallback: Option<Arc<dyn FallbackHandler>>,
    telemetry: Option<SharedTelemetry>,
}

impl<T> Default for RetryOptions<T> {
    fn default() -> Self {
        Self::from_tuning(&RetryTuning::default())
    }
}

impl<T> RetryOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tuning(tuning: &RetryTuning) -> Self {
        Self {
            max_attempts: tuning.max_attempts,
            initial_delay: tuning.initial_delay(),
            max_delay: tuning.max_delay(),
            cancel: None,
            classify_error: Arc::new(classify),
            retry_on_content: None,
            fallback: None,
            telemetry: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Replace the default error classifier.
    pub fn with_classifier(mut self, classify_error: ClassifyFn) -> Self {
        self.classify_error = classify_error;
        self
    }

    /// Retry successful responses the check marks defective. If the final
    /// attempt is still defective, the payload is returned as-is.
    pub fn with_content_check(
        mut self,
        check: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.retry_on_content = Some(Arc::new(check));
        self
    }

    pub fn with_fallback(mut self, handler: Arc<dyn FallbackHandler>) -> Self {
        self.fallback = Some(handler);
        self
    }

    pub fn with_telemetry(mut self, telemetry: SharedTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }
}

/// Run `operation` under the retry policy in `options`.
///
/// Terminal quota errors consult the fallback handler: a `Retry` intent
/// restarts the loop with a fresh budget, anything else propagates the
/// original error. Exhausting the budget on retryable errors yields
/// [`ApiError::RetryExhausted`] so callers can tell exhaustion from a
/// straight failure.
pub async fn retry_with_backoff<T, F, Fut>(
    mut operation: F,
    options: RetryOptions<T>,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let max_attempts = options.max_attempts.max(1);
    let mut attempt: u32 = 0;
    let mut current_delay = options.initial_delay;

    loop {
        if let Some(cancel) = &options.cancel {
            if cancel.is_cancelled() {
                return Err(ApiError::Cancelled);
            }
        }
        attempt += 1;

        match operation().await {
            Ok(value) => {
                let defective = options
                    .retry_on_content
                    .as_ref()
                    .map(|check| check(&value))
                    .unwrap_or(false);
                if !defective {
                    return Ok(value);
                }
                if attempt >= max_attempts {
                    // Out of budget: hand back what we got rather than
                    // replace an existing response with an error.
                    tracing::warn!(
                        target: LOG_TARGET,
                        attempts = attempt,
                        "returning defective response after final attempt"
                    );
                    return Ok(value);
                }
                tracing::debug!(target: LOG_TARGET, attempt, "response failed content check");
                let delay = with_jitter(current_delay);
                record_wait(&options, attempt, delay, false);
                sleep_cancellable(&options, delay).await?;
                current_delay = next_delay(current_delay, options.max_delay);
            }
            Err(error) => {
                let class = (options.classify_error)(&error);

                if class == ErrorClass::TerminalQuota {
                    let Some(handler) = &options.fallback else {
                        return Err(error);
                    };
                    match handler.on_terminal_quota(&error).await {
                        Ok(Some(FallbackIntent::Retry)) => {
                            tracing::info!(
                                target: LOG_TARGET,
                                "fallback accepted, restarting with a fresh budget"
                            );
                            attempt = 0;
                            current_delay = options.initial_delay;
                            continue;
                        }
                        Ok(intent) => {
                            tracing::debug!(
                                target: LOG_TARGET,
                                intent = intent.map(|i| i.as_str()).unwrap_or("none"),
                                "fallback declined"
                            );
                            return Err(error);
                        }
                        Err(handler_error) => {
                            tracing::error!(
                                target: LOG_TARGET,
                                error = %handler_error,
                                "fallback handler failed"
                            );
                            return Err(error);
                        }
                    }
                }

                if !class.is_retryable() {
                    return Err(error);
                }

                if attempt >= max_attempts {
                    tracing::warn!(
                        target: LOG_TARGET,
                        attempts = attempt,
                        error = %error,
                        "retry budget exhausted"
                    );
                    return Err(ApiError::RetryExhausted {
                        attempts: attempt,
                        last_error: error.to_string(),
                    });
                }

                match class.server_delay() {
                    // The server said how long to wait. Honor it verbatim
                    // and keep the exponential schedule where it was.
                    Some(server_delay) => {
                        record_wait(&options, attempt, server_delay, true);
                        sleep_cancellable(&options, server_delay).await?;
                    }
                    None => {
                        let delay = with_jitter(current_delay);
                        record_wait(&options, attempt, delay, false);
                        sleep_cancellable(&options, delay).await?;
                        current_delay = next_delay(current_delay, options.max_delay);
                    }
                }
            }
        }
    }
}

fn with_jitter(delay: Duration) -> Duration {
    let spread = rand::thread_rng().gen_range(-JITTER_FACTOR..=JITTER_FACTOR);
    Duration::from_secs_f64((delay.as_secs_f64() * (1.0 + spread)).max(0.0))
}

fn next_delay(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}

fn record_wait<T>(
    options: &RetryOptions<T>,
    attempt: u32,
    delay: Duration,
    server_declared: bool,
) {
    tracing::info!(
        target: LOG_TARGET,
        attempt,
        delay_ms = delay.as_millis() as u64,
        server_declared,
        "waiting before retry"
    );
    if let Some(telemetry) = &options.telemetry {
        telemetry.record(TelemetryEvent::retry_wait(
            attempt,
            delay.as_millis() as u64,
            server_declared,
        ));
    }
}

async fn sleep_cancellable<T>(
    options: &RetryOptions<T>,
    delay: Duration,
) -> Result<(), ApiError> {
    match &options.cancel {
        Some(cancel) => {
            tokio::select! {
                _ = cancel.cancelled() => Err(ApiError::Cancelled),
                _ = tokio::time::sleep(delay) => Ok(()),
            }
        }
        None => {
            tokio::time::sleep(delay).await;
            Ok(())
        }
    }
}
