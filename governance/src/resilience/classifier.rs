//! API error taxonomy for retry decisions.
//!
//! Transports surface [`ApiError`]; [`classify`] maps each error onto an
//! [`ErrorClass`] that the retry loop interprets. Quota handling pivots on
//! what the server tells us: a declared retry delay means wait-and-retry, a
//! daily or plan-level limit with no delay means the model is done for the
//! session.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Message fragments marking a quota error as unrecoverable within the
/// session.
const TERMINAL_QUOTA_MARKERS: &[&str] = &["per day", "daily", "plan limit", "current plan"];

/// Failure surfaced by a model transport or the retry loop itself.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http {status}: {message}")]
    Http {
        status: u16,
        message: String,
        /// Structured error payload from the server, when one was parsed.
        details: Option<Value>,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("retry budget exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },
}

impl ApiError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        ApiError::Http {
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn http_with_details(status: u16, message: impl Into<String>, details: Value) -> Self {
        ApiError::Http {
            status,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// What the retry loop should do with an error.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorClass {
    /// Ordinary failure; `retryable` says whether another attempt makes
    /// sense.
    Generic { retryable: bool },
    /// Quota pressure with a server-declared recovery delay.
    RetryableQuota { retry_delay: Duration },
    /// Quota exhausted for the day or plan. Retrying the same model is
    /// pointless.
    TerminalQuota,
}

impl ErrorClass {
    pub fn is_retryable(&self) -> bool {
        match self {
            ErrorClass::Generic { retryable } => *retryable,
            ErrorClass::RetryableQuota { .. } => true,
            ErrorClass::TerminalQuota => false,
        }
    }

    /// The server-declared wait, when the server gave one.
    pub fn server_delay(&self) -> Option<Duration> {
        match self {
            ErrorClass::RetryableQuota { retry_delay } => Some(*retry_delay),
            _ => None,
        }
    }
}

/// Map an error onto its retry class.
///
/// Bad requests are never retried, whatever their message says: resending
/// the same malformed payload cannot succeed.
pub fn classify(error: &ApiError) -> ErrorClass {
    match error {
        ApiError::Http { status: 400, .. } => ErrorClass::Generic { retryable: false },
        ApiError::Http {
            status: 429,
            message,
            details,
        } => classify_quota(message, details.as_ref()),
        ApiError::Http { status, .. } if (500..600).contains(status) => {
            ErrorClass::Generic { retryable: true }
        }
        ApiError::Http { .. } => ErrorClass::Generic { retryable: false },
        ApiError::Network(_) => ErrorClass::Generic { retryable: true },
        ApiError::Cancelled | ApiError::RetryExhausted { .. } => {
            ErrorClass::Generic { retryable: false }
        }
    }
}

fn classify_quota(message: &str, details: Option<&Value>) -> ErrorClass {
    if let Some(retry_delay) = retry_delay_hint(message, details) {
        return ErrorClass::RetryableQuota { retry_delay };
    }
    if is_terminal_quota_message(message) {
        return ErrorClass::TerminalQuota;
    }
    ErrorClass::Generic { retryable: true }
}

fn is_terminal_quota_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    TERMINAL_QUOTA_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Server-declared retry delay, from structured details when present and
/// from the raw message otherwise.
fn retry_delay_hint(message: &str, details: Option<&Value>) -> Option<Duration> {
    if let Some(details) = details {
        if let Some(delay) = delay_from_details(details) {
            return Some(delay);
        }
    }
    delay_from_message(message)
}

/// Walk an error payload looking for a `RetryInfo` entry. Accepts either a
/// bare details array or a full `{"error": {"details": [...]}}` envelope.
fn delay_from_details(details: &Value) -> Option<Duration> {
    let entries: &[Value] = match details {
        Value::Array(entries) => entries,
        Value::Object(_) => details
            .get("error")
            .and_then(|error| error.get("details"))
            .or_else(|| details.get("details"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    };

    for entry in entries {
        let is_retry_info = entry
            .get("@type")
            .and_then(Value::as_str)
            .map(|t| t.ends_with("RetryInfo"))
            .unwrap_or(true);
        if !is_retry_info {
            continue;
        }
        if let Some(raw) = entry.get("retryDelay").and_then(Value::as_str) {
            if let Some(delay) = parse_retry_delay(raw) {
                return Some(delay);
            }
        }
    }
    None
}

fn delay_from_message(message: &str) -> Option<Duration> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| Regex::new(r#""retryDelay"\s*:\s*"([0-9.]+)s""#).ok())
        .as_ref()?;
    let captures = pattern.captures(message)?;
    parse_retry_delay(&format!("{}s", captures.get(1)?.as_str()))
}

/// Parse the protobuf duration form `"30s"` / `"2.5s"`.
fn parse_retry_delay(raw: &str) -> Option<Duration> {
    let seconds: f64 = raw.trim().strip_suffix('s')?.parse().ok()?;
    if seconds.is_finite() && seconds >= 0.0 {
        Some(Duration::from_secs_f64(seconds))
    } else {
        None
    }
}
