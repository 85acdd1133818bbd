//! Retry, error classification, and model fallback.
//!
//! The pieces compose around one loop:
//!
//! ```text
//!   operation() ──Err──> classify ──retryable──> backoff sleep ──> retry
//!                           |
//!                           |──terminal quota──> FallbackHandler
//!                           |                      Retry: fresh budget
//!                           |                      else: propagate error
//!                           `──not retryable────> propagate error
//! ```
//!
//! Classification is pure and synchronous; the loop owns all waiting; the
//! fallback coordinator owns the session-level model switch.

mod backoff;
mod classifier;
mod fallback;

pub use backoff::{retry_with_backoff, ClassifyFn, ContentCheck, RetryOptions};
pub use classifier::{classify, ApiError, ErrorClass};
pub use fallback::{
    AcceptFallback, FallbackCoordinator, FallbackDecider, FallbackHandler, FallbackIntent,
};
