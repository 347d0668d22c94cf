//! HTTP fetcher implementation
//!
//! This module handles page retrieval for the crawler, including:
//! - The [`PageFetcher`] seam shared by the direct and render strategies
//! - Building HTTP clients with proper user agent strings
//! - Manual redirect handling with loop detection and per-hop SSRF checks
//! - Retry logic for transient failures
//! - Content-type gating (only HTML-like responses are pages)

use crate::crawler::retry::{send_with_retry, SendError};
use crate::crawler::{CrawlOptions, RetryPolicy};
use crate::url::guard;
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{redirect::Policy, Client};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// Content types accepted as pages
const HTML_CONTENT_TYPES: &[&str] = &["text/html", "application/xhtml+xml"];

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchResult {
    /// Successfully fetched the page
    Success {
        /// Final URL after redirects
        final_url: Url,
        /// HTTP status code
        status_code: u16,
        /// Content-Type header value
        content_type: String,
        /// Page body content
        body: String,
    },

    /// Response is not HTML (Content-Type mismatch)
    ContentMismatch {
        /// The actual Content-Type received
        content_type: String,
    },

    /// Terminal HTTP error, or a transient one that outlived its retries
    HttpError {
        /// The HTTP status code
        status_code: u16,
    },

    /// Network error (connection refused, reset, TLS failure, etc.)
    NetworkError {
        /// Error description
        error: String,
    },

    /// Redirect error (loop, too many redirects, missing Location)
    RedirectError {
        /// Error description
        error: String,
    },

    /// Target refused by the SSRF guard
    Blocked {
        /// Why the host was refused
        reason: String,
    },

    /// The fetch did not finish within its deadline
    Timeout,
}

impl FetchResult {
    /// One-line description of a failure, used in crawl error records
    pub fn describe(&self) -> String {
        match self {
            FetchResult::Success { status_code, .. } => format!("HTTP {}", status_code),
            FetchResult::ContentMismatch { content_type } => {
                format!("not an HTML page (content-type: {})", content_type)
            }
            FetchResult::HttpError { status_code } => format!("HTTP {}", status_code),
            FetchResult::NetworkError { error } => format!("network error: {}", error),
            FetchResult::RedirectError { error } => format!("redirect error: {}", error),
            FetchResult::Blocked { reason } => format!("blocked target: {}", reason),
            FetchResult::Timeout => "timed out".to_string(),
        }
    }
}

impl From<SendError> for FetchResult {
    fn from(error: SendError) -> Self {
        match error {
            SendError::Status(status) => FetchResult::HttpError {
                status_code: status.as_u16(),
            },
            SendError::Timeout => FetchResult::Timeout,
            SendError::Network(error) => FetchResult::NetworkError { error },
        }
    }
}

/// Retrieves one page
///
/// Implemented by the direct HTTP fetcher and, with the `render` feature, by
/// the headless browser fetcher.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetches `url`; `timeout` bounds each individual request
    async fn fetch(&self, url: &Url, timeout: Duration) -> FetchResult;

    /// Short strategy name for logs and statistics
    fn name(&self) -> &'static str;

    /// True when returned bodies are the rendered DOM rather than raw markup
    fn renders_dom(&self) -> bool {
        false
    }
}

/// Returns true if the Content-Type denotes an HTML page
pub fn is_html_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    HTML_CONTENT_TYPES.contains(&mime.as_str())
}

/// Builds an HTTP client that does not follow redirects
///
/// # Arguments
///
/// * `user_agent` - The full User-Agent header value
/// * `timeout` - Per-request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(user_agent: &str, timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(Policy::none()) // Handle redirects manually
        .gzip(true)
        .brotli(true)
        .build()
}

/// Direct HTTP fetcher
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    retry: RetryPolicy,
    max_redirects: usize,
    allow_private_hosts: bool,
}

impl HttpFetcher {
    pub fn new(options: &CrawlOptions) -> Result<Self, reqwest::Error> {
        let client = build_http_client(&options.user_agent, options.per_page_timeout)?;
        Ok(Self {
            client,
            retry: options.retry.clone(),
            max_redirects: options.max_redirects,
            allow_private_hosts: options.allow_private_hosts,
        })
    }

    /// Checks a redirect hop against the SSRF guard
    ///
    /// Every hop gets the literal check; hops that leave the original host
    /// are also resolved.
    async fn check_hop(&self, origin: &Url, hop: &Url) -> Result<(), String> {
        if self.allow_private_hosts {
            return Ok(());
        }
        if hop.host_str() == origin.host_str() {
            guard::check_url_literal(hop).map_err(|e| e.to_string())
        } else {
            guard::check_resolved(hop).await.map_err(|e| e.to_string())
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    /// Fetches a URL with full error handling and retry logic
    ///
    /// # Request Flow
    ///
    /// 1. Send GET request (transient failures retried with backoff)
    /// 2. Follow redirects manually (at most `max_redirects` hops)
    ///    - Track visited URLs to detect loops
    ///    - Check each hop against the SSRF guard
    /// 3. Reject non-HTML responses by Content-Type
    /// 4. Read the body
    async fn fetch(&self, url: &Url, timeout: Duration) -> FetchResult {
        let mut current = url.clone();
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(current.to_string());

        for hop in 0..=self.max_redirects {
            let response = match send_with_retry(
                || self.client.get(current.clone()).timeout(timeout),
                &current,
                &self.retry,
            )
            .await
            {
                Ok(response) => response,
                Err(e) => return e.into(),
            };

            let status = response.status();

            if status.is_redirection() {
                let Some(location) = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                else {
                    return FetchResult::RedirectError {
                        error: format!("HTTP {} without Location header", status.as_u16()),
                    };
                };

                let next = match current.join(location) {
                    Ok(next) => next,
                    Err(e) => {
                        return FetchResult::RedirectError {
                            error: format!("invalid Location {:?}: {}", location, e),
                        }
                    }
                };

                if next.scheme() != "http" && next.scheme() != "https" {
                    return FetchResult::RedirectError {
                        error: format!("redirect to unsupported scheme: {}", next),
                    };
                }

                if !visited.insert(next.to_string()) {
                    return FetchResult::RedirectError {
                        error: format!("redirect loop at {}", next),
                    };
                }

                if let Err(reason) = self.check_hop(url, &next).await {
                    return FetchResult::Blocked { reason };
                }

                tracing::trace!("Redirect hop {}: {} -> {}", hop + 1, current, next);
                current = next;
                continue;
            }

            let content_type = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();

            if !content_type.is_empty() && !is_html_content_type(&content_type) {
                return FetchResult::ContentMismatch { content_type };
            }

            let final_url = response.url().clone();
            return match response.text().await {
                Ok(body) => {
                    if content_type.is_empty() && !looks_like_html(&body) {
                        return FetchResult::ContentMismatch { content_type };
                    }
                    FetchResult::Success {
                        final_url,
                        status_code: status.as_u16(),
                        content_type: if content_type.is_empty() {
                            "text/html".to_string()
                        } else {
                            content_type
                        },
                        body,
                    }
                }
                Err(e) if e.is_timeout() => FetchResult::Timeout,
                Err(e) => FetchResult::NetworkError {
                    error: e.to_string(),
                },
            };
        }

        FetchResult::RedirectError {
            error: format!("more than {} redirects", self.max_redirects),
        }
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

/// Sniffs an untyped body for an HTML document
fn looks_like_html(body: &str) -> bool {
    let head: String = body
        .trim_start()
        .chars()
        .take(256)
        .collect::<String>()
        .to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.starts_with("<html") || head.contains("<head")
}
