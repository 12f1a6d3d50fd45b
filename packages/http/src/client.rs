//! The shared rate-limited client.
//!
//! Wraps a [`reqwest::Client`] with per-host token buckets and a retry
//! loop. Callers never retry on their own; every fetcher in the
//! workspace issues requests through the helpers here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use leaky_bucket::RateLimiter;
use rand::Rng;

use crate::{CancelToken, HttpClientConfig, HttpError};

/// Maximum random jitter added to each backoff delay.
const JITTER_MS: u64 = 250;

/// HTTP client with per-host token-bucket rate limiting and retries.
///
/// Cloning is cheap; all clones share the same buckets and cancel
/// signal.
#[derive(Clone)]
pub struct RateLimitedClient {
    client: reqwest::Client,
    buckets: Arc<Mutex<HashMap<String, Arc<RateLimiter>>>>,
    config: HttpClientConfig,
    cancel: CancelToken,
}

impl RateLimitedClient {
    /// Builds a client from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Transport`] if the underlying client cannot
    /// be constructed.
    pub fn new(config: HttpClientConfig, cancel: CancelToken) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            buckets: Arc::new(Mutex::new(HashMap::new())),
            config,
            cancel,
        })
    }

    /// Returns the shared cancel token.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Waits until the token bucket for `host` allows another request.
    ///
    /// Exposed separately so rate behavior is testable without network
    /// access; the request helpers call this internally.
    pub async fn throttle(&self, host: &str) {
        let limiter = {
            let mut buckets = match self.buckets.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(buckets.entry(host.to_string()).or_insert_with(|| {
                let rpm = self.config.requests_per_minute.max(1);
                let interval = Duration::from_secs_f64(60.0 / f64::from(rpm));
                Arc::new(
                    RateLimiter::builder()
                        .max(rpm as usize)
                        .initial(rpm as usize)
                        .refill(1)
                        .interval(interval)
                        .build(),
                )
            }))
        };

        limiter.acquire_one().await;
    }

    /// GET the URL and parse the response body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError`] if every retry fails, the final status is
    /// not successful, or the body is not valid JSON.
    pub async fn get_json(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, HttpError> {
        self.get_json_with_timeout(url, query, self.config.timeout)
            .await
    }

    /// GET with an explicit timeout (`TIGERweb` responses need longer
    /// than the default).
    ///
    /// # Errors
    ///
    /// Same as [`get_json`](Self::get_json).
    pub async fn get_json_with_timeout(
        &self,
        url: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<serde_json::Value, HttpError> {
        let host = host_of(url)?;
        let body = self
            .request_with_retry(&host, || {
                self.client.get(url).query(query).timeout(timeout)
            })
            .await?;
        parse_json(&host, &body)
    }

    /// GET the URL and return the raw response body.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError`] if every retry fails or the final status is
    /// not successful.
    pub async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String, HttpError> {
        let host = host_of(url)?;
        self.request_with_retry(&host, || {
            self.client
                .get(url)
                .query(query)
                .timeout(self.config.timeout)
        })
        .await
    }

    /// POST a `application/x-www-form-urlencoded` body and parse the
    /// response as JSON. Used for Overpass QL queries.
    ///
    /// # Errors
    ///
    /// Same as [`get_json`](Self::get_json).
    pub async fn post_form_json(
        &self,
        url: &str,
        body: String,
        timeout: Duration,
    ) -> Result<serde_json::Value, HttpError> {
        let host = host_of(url)?;
        let text = self
            .request_with_retry(&host, || {
                self.client
                    .post(url)
                    .header(
                        reqwest::header::CONTENT_TYPE,
                        "application/x-www-form-urlencoded",
                    )
                    .body(body.clone())
                    .timeout(timeout)
            })
            .await?;
        parse_json(&host, &text)
    }

    /// Core retry loop: throttle, send, classify, back off.
    ///
    /// Retries transport errors, HTTP 429, and 5xx up to the configured
    /// budget. 4xx other than 429 is permanent. 429 backoff honors a
    /// numeric `Retry-After` header when present.
    async fn request_with_retry<F>(&self, host: &str, build_request: F) -> Result<String, HttpError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let max_retries = self.config.max_retries;

        for attempt in 0..=max_retries {
            if self.cancel.is_cancelled() {
                return Err(HttpError::Cancelled);
            }

            self.throttle(host).await;

            let response = match build_request().send().await {
                Ok(response) => response,
                Err(e) => {
                    if is_transient(&e) && attempt < max_retries {
                        log::warn!("{host}: transient error ({e}), retry {}", attempt + 1);
                        self.backoff(attempt, None).await;
                        continue;
                    }
                    return Err(HttpError::Transport(e));
                }
            };

            let status = response.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if attempt < max_retries {
                    let retry_after = retry_after_of(&response);
                    log::warn!(
                        "{host}: HTTP 429, retry {} (Retry-After: {retry_after:?})",
                        attempt + 1
                    );
                    self.backoff(attempt, retry_after).await;
                    continue;
                }
                return Err(HttpError::RateLimited {
                    host: host.to_string(),
                    attempts: max_retries + 1,
                });
            }

            if status.is_server_error() {
                if attempt < max_retries {
                    log::warn!("{host}: HTTP {status}, retry {}", attempt + 1);
                    self.backoff(attempt, None).await;
                    continue;
                }
                return Err(HttpError::Status {
                    host: host.to_string(),
                    status: status.as_u16(),
                });
            }

            if status.is_client_error() {
                return Err(HttpError::Status {
                    host: host.to_string(),
                    status: status.as_u16(),
                });
            }

            return response.text().await.map_err(HttpError::Transport);
        }

        unreachable!("retry loop exited without returning")
    }

    /// Sleeps `base * 2^attempt` plus jitter, or at least `floor` when
    /// the server asked for a longer wait.
    async fn backoff(&self, attempt: u32, floor: Option<Duration>) {
        let jitter = Duration::from_millis(rand::rng().random_range(0..=JITTER_MS));
        let mut delay = self.config.backoff_base * 2u32.saturating_pow(attempt) + jitter;
        if let Some(floor) = floor {
            delay = delay.max(floor);
        }
        tokio::time::sleep(delay).await;
    }
}

/// Extracts the host component used as the token-bucket key.
fn host_of(url: &str) -> Result<String, HttpError> {
    let parsed =
        reqwest::Url::parse(url).map_err(|e| HttpError::InvalidUrl(format!("{url}: {e}")))?;
    parsed
        .host_str()
        .map(ToString::to_string)
        .ok_or_else(|| HttpError::InvalidUrl(format!("{url}: missing host")))
}

/// Parses a response body as JSON, attributing failures to the host.
fn parse_json(host: &str, body: &str) -> Result<serde_json::Value, HttpError> {
    serde_json::from_str(body).map_err(|e| HttpError::Parse {
        host: host.to_string(),
        message: e.to_string(),
    })
}

/// Reads a numeric `Retry-After` header, if the server sent one.
fn retry_after_of(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_decode() || e.is_request()
}
