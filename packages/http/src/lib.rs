#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Rate-limited HTTP client shared by every upstream fetcher.
//!
//! All network traffic in the workspace (Census Data API, Census geocoder,
//! `TIGERweb`, Overpass) flows through [`RateLimitedClient`] so a single
//! configuration knob governs external load. The client enforces a
//! per-host token bucket before each request, retries transient failures
//! with exponential backoff plus jitter, honors `Retry-After` on HTTP
//! 429, and checks a shared [`CancelToken`] between attempts.

mod client;

pub use client::RateLimitedClient;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;

/// Errors from rate-limited HTTP operations.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Transport-level failure (connection, TLS, timeout) after retries.
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Upstream returned a non-success status that is not retryable, or
    /// a retryable status survived every retry.
    #[error("HTTP {status} from {host}")]
    Status {
        /// Host the request was sent to.
        host: String,
        /// Final status code observed.
        status: u16,
    },

    /// HTTP 429 with the retry budget exhausted.
    #[error("rate limited by {host} after {attempts} attempts")]
    RateLimited {
        /// Host that kept answering 429.
        host: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// Response body could not be parsed as JSON.
    #[error("response parse error from {host}: {message}")]
    Parse {
        /// Host the malformed payload came from.
        host: String,
        /// Description of the parse failure.
        message: String,
    },

    /// The request URL could not be interpreted.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The shared cancel signal fired before the request completed.
    #[error("request cancelled")]
    Cancelled,
}

/// Configuration for [`RateLimitedClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Token-bucket fill rate, in requests per minute per host.
    pub requests_per_minute: u32,
    /// Default per-request timeout.
    pub timeout: Duration,
    /// Maximum retry attempts for transient errors (429/5xx/transport).
    pub max_retries: u32,
    /// Base delay for exponential backoff (`base * 2^attempt`).
    pub backoff_base: Duration,
    /// `User-Agent` sent with every request.
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            user_agent: concat!("socialmapper/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Cooperative cancellation signal shared across in-flight workers.
///
/// Cancellation is checked at suspension points (before each request and
/// between retries); it does not abort a request already on the wire.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals every holder of this token to stop at the next check.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_round_trip() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn default_config_is_one_per_second() {
        let config = HttpClientConfig::default();
        assert_eq!(config.requests_per_minute, 60);
        assert_eq!(config.max_retries, 3);
    }
}
