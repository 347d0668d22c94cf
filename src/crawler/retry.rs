//! Retry with exponential backoff
//!
//! Shared by page fetches, sitemap fetches and robots.txt. Timeouts, network
//! resets, 5xx, 408 and 429 are retried; every other status is terminal.

use rand::Rng;
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Failure of a request after retries were exhausted (or skipped)
#[derive(Debug, Error)]
pub enum SendError {
    #[error("HTTP {}", .0.as_u16())]
    Status(StatusCode),

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),
}

impl SendError {
    fn from_reqwest(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Network(error.to_string())
        }
    }
}

/// Backoff policy: `base_delay * 2^(attempt - 1)` plus up to half a base
/// delay of jitter, capped at `max_delay`
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self.base_delay.saturating_mul(1u32 << exponent);
        let jitter_ceiling = (self.base_delay.as_millis() / 2) as u64;
        let jitter = if jitter_ceiling > 0 {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ceiling))
        } else {
            Duration::ZERO
        };
        (base + jitter).min(self.max_delay)
    }
}

/// Returns true for statuses worth retrying
pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

/// Returns true for client errors worth retrying (timeouts, resets, refused connections)
pub fn is_transient_error(error: &reqwest::Error) -> bool {
    !(error.is_builder() || error.is_redirect() || error.is_status() || error.is_decode())
}

/// Sends a request, retrying transient failures with backoff
///
/// `build` is called once per attempt since a `RequestBuilder` is consumed by
/// sending. Success and redirect responses are returned as-is; any other
/// status becomes [`SendError::Status`] once it is terminal or retries run out.
pub async fn send_with_retry<F>(build: F, url: &Url, policy: &RetryPolicy) -> Result<Response, SendError>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 1;

    loop {
        let failure = match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() || status.is_redirection() {
                    return Ok(response);
                }
                if !is_transient_status(status) {
                    return Err(SendError::Status(status));
                }
                SendError::Status(status)
            }
            Err(e) => {
                let failure = SendError::from_reqwest(&e);
                if !is_transient_error(&e) {
                    return Err(failure);
                }
                failure
            }
        };

        if attempt >= policy.max_attempts {
            tracing::debug!("Giving up on {} after {} attempts: {}", url, attempt, failure);
            return Err(failure);
        }

        let delay = policy.backoff(attempt);
        tracing::debug!(
            "Attempt {}/{} for {} failed ({}), retrying in {:?}",
            attempt,
            policy.max_attempts,
            url,
            failure,
            delay
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
