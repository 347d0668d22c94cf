//! Recursive sitemap resolution
//!
//! Fetches a sitemap, and for an index fetches every child concurrently in
//! its own task. Revisits and depth overflow end a branch with no URLs; a
//! failing child is recorded and its siblings are kept.

use crate::crawler::{send_with_retry, CrawlOptions, RetryPolicy, SendError};
use crate::sitemap::parser::{parse_sitemap_document, SitemapDocument};
use crate::url::guard;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::redirect::Policy;
use reqwest::Client;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use url::Url;

/// Lowest accepted recursion bound
pub const MIN_SITEMAP_DEPTH: usize = 8;

/// One sitemap that could not be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapFailure {
    pub url: String,
    pub message: String,
}

/// Flattened result of resolving a sitemap tree
#[derive(Debug, Clone, Default)]
pub struct SitemapResolution {
    /// Page URLs in document order, duplicates removed
    pub urls: Vec<String>,
    /// Sitemaps that failed to fetch
    pub errors: Vec<SitemapFailure>,
    /// Sitemap documents fetched successfully
    pub sitemaps_fetched: usize,
}

impl SitemapResolution {
    fn merge(&mut self, other: SitemapResolution) {
        self.urls.extend(other.urls);
        self.errors.extend(other.errors);
        self.sitemaps_fetched += other.sitemaps_fetched;
    }

    fn dedupe(&mut self) {
        let mut seen = HashSet::new();
        self.urls.retain(|url| seen.insert(url.clone()));
    }
}

type VisitedSitemaps = Arc<Mutex<HashSet<String>>>;

/// Discovers and resolves a site's sitemaps
#[derive(Debug, Clone)]
pub struct SitemapResolver {
    pub(crate) client: Client,
    pub(crate) retry: RetryPolicy,
    max_depth: usize,
    pub(crate) allow_private_hosts: bool,
}

impl SitemapResolver {
    /// Creates a resolver
    ///
    /// `max_depth` below [`MIN_SITEMAP_DEPTH`] is raised to it.
    pub fn new(client: Client, retry: RetryPolicy, max_depth: usize, allow_private_hosts: bool) -> Self {
        Self {
            client,
            retry,
            max_depth: max_depth.max(MIN_SITEMAP_DEPTH),
            allow_private_hosts,
        }
    }

    /// Builds a resolver with its own redirect-following client
    pub fn from_options(options: &CrawlOptions) -> Result<Self, reqwest::Error> {
        let client = build_sitemap_client(
            &options.user_agent,
            options.per_page_timeout,
            options.max_redirects,
            options.allow_private_hosts,
        )?;
        Ok(Self::new(
            client,
            options.retry.clone(),
            options.sitemap_max_depth,
            options.allow_private_hosts,
        ))
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Resolves a sitemap into its flat list of page URLs
    pub async fn parse(&self, sitemap: &Url) -> Vec<String> {
        self.resolve(sitemap).await.urls
    }

    /// Resolves a sitemap tree, keeping per-sitemap failures
    ///
    /// # Arguments
    ///
    /// * `sitemap` - URL of a sitemap or sitemap index
    ///
    /// # Returns
    ///
    /// Page URLs in document order (children in index order), deduplicated,
    /// plus one failure record per sitemap that could not be fetched.
    pub async fn resolve(&self, sitemap: &Url) -> SitemapResolution {
        let visited: VisitedSitemaps = Arc::new(Mutex::new(HashSet::new()));
        let mut resolution = self.resolve_node(sitemap.clone(), 0, visited).await;
        resolution.dedupe();

        tracing::info!(
            "Resolved sitemap {}: {} URLs from {} documents ({} failed)",
            sitemap,
            resolution.urls.len(),
            resolution.sitemaps_fetched,
            resolution.errors.len()
        );

        resolution
    }

    fn resolve_node(&self, url: Url, depth: usize, visited: VisitedSitemaps) -> BoxFuture<'static, SitemapResolution> {
        let resolver = self.clone();

        async move {
            let mut resolution = SitemapResolution::default();

            if depth > resolver.max_depth {
                tracing::warn!("Sitemap depth limit ({}) reached at {}", resolver.max_depth, url);
                return resolution;
            }

            {
                let mut seen = visited.lock().unwrap_or_else(PoisonError::into_inner);
                if !seen.insert(url.as_str().to_string()) {
                    tracing::debug!("Sitemap {} already visited, skipping", url);
                    return resolution;
                }
            }

            let body = match resolver.fetch_document(&url).await {
                Ok(body) => body,
                Err(message) => {
                    tracing::warn!("Failed to fetch sitemap {}: {}", url, message);
                    resolution.errors.push(SitemapFailure {
                        url: url.to_string(),
                        message,
                    });
                    return resolution;
                }
            };
            resolution.sitemaps_fetched += 1;

            match parse_sitemap_document(&body) {
                SitemapDocument::UrlSet(locations) => {
                    tracing::debug!("Sitemap {} lists {} URLs", url, locations.len());
                    resolution.urls = locations;
                }
                SitemapDocument::Index(children) => {
                    tracing::debug!("Sitemap index {} lists {} children", url, children.len());

                    let handles: Vec<_> = children
                        .iter()
                        .filter_map(|loc| url.join(loc.trim()).ok())
                        .map(|child| {
                            let task = tokio::spawn(resolver.resolve_node(child.clone(), depth + 1, visited.clone()));
                            (child, task)
                        })
                        .collect();

                    for (child, task) in handles {
                        match task.await {
                            Ok(child_resolution) => resolution.merge(child_resolution),
                            Err(e) => {
                                tracing::warn!("Sitemap task for {} failed: {}", child, e);
                                resolution.errors.push(SitemapFailure {
                                    url: child.to_string(),
                                    message: format!("task failed: {}", e),
                                });
                            }
                        }
                    }
                }
            }

            resolution
        }
        .boxed()
    }

    /// Fetches a sitemap body with retries
    async fn fetch_document(&self, url: &Url) -> Result<String, String> {
        if !self.allow_private_hosts {
            guard::check_url_literal(url).map_err(|e| e.to_string())?;
        }

        let response = send_with_retry(|| self.client.get(url.clone()), url, &self.retry)
            .await
            .map_err(|e| e.to_string())?;

        if response.status().is_redirection() {
            return Err(SendError::Status(response.status()).to_string());
        }

        response.text().await.map_err(|e| e.to_string())
    }

    /// Lightweight existence check: HEAD, falling back to GET when HEAD is
    /// not supported. Only a final 200 counts.
    pub async fn exists(&self, url: &Url) -> bool {
        if !self.allow_private_hosts && guard::check_url_literal(url).is_err() {
            return false;
        }

        match self.client.head(url.clone()).send().await {
            Ok(response) if response.status() == reqwest::StatusCode::OK => true,
            Ok(response)
                if response.status() == reqwest::StatusCode::METHOD_NOT_ALLOWED
                    || response.status() == reqwest::StatusCode::NOT_IMPLEMENTED =>
            {
                matches!(
                    self.client.get(url.clone()).send().await,
                    Ok(r) if r.status() == reqwest::StatusCode::OK
                )
            }
            Ok(response) => {
                tracing::trace!("No sitemap at {} (HTTP {})", url, response.status().as_u16());
                false
            }
            Err(e) => {
                tracing::trace!("Sitemap probe {} failed: {}", url, e);
                false
            }
        }
    }
}

/// Builds the client used for sitemap and robots.txt requests
///
/// Redirects are followed up to `max_redirects` hops; a hop to a private or
/// loopback host stops the chain unless private hosts are allowed.
pub fn build_sitemap_client(
    user_agent: &str,
    timeout: Duration,
    max_redirects: usize,
    allow_private_hosts: bool,
) -> Result<Client, reqwest::Error> {
    let policy = Policy::custom(move |attempt| {
        if attempt.previous().len() > max_redirects {
            attempt.error("too many redirects")
        } else if !allow_private_hosts && guard::check_url_literal(attempt.url()).is_err() {
            attempt.stop()
        } else {
            attempt.follow()
        }
    });

    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .redirect(policy)
        .gzip(true)
        .brotli(true)
        .build()
}
