//! Retry and backoff policy.
//!
//! This module encapsulates error classification (timeouts, server errors,
//! connection failures, client errors) and exponential backoff decisions so
//! the transfer engine can decide between retrying on the same mirror and
//! rotating to the next one.

mod classify;
mod error;
mod policy;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::AttemptError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
