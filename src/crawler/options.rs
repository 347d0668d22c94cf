//! Crawl options
//!
//! Runtime settings for one crawl. Built either directly (library use) or
//! from a loaded [`Config`] file.

use crate::config::Config;
use crate::crawler::RetryPolicy;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// How pages are retrieved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    /// Plain HTTP GET
    #[default]
    Direct,
    /// Headless browser that executes page scripts before capturing the DOM
    Render,
}

impl FetchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStrategy::Direct => "direct",
            FetchStrategy::Render => "render",
        }
    }
}

impl std::fmt::Display for FetchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options controlling a single crawl
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Upper bound on retrieved pages
    pub max_pages: usize,

    /// Hard deadline for each page fetch (retries included)
    pub per_page_timeout: Duration,

    /// Number of concurrent fetch workers
    pub max_concurrent_fetches: usize,

    pub strategy: FetchStrategy,

    /// Extract links from fetched pages and enqueue them
    pub follow_links: bool,

    /// Skip candidates disallowed by robots.txt (the root is always fetched)
    pub respect_robots: bool,

    /// Permit loopback and private network targets
    pub allow_private_hosts: bool,

    /// Maximum nesting of sitemap indexes
    pub sitemap_max_depth: usize,

    /// Maximum redirect hops for a direct fetch
    pub max_redirects: usize,

    pub retry: RetryPolicy,

    /// Full User-Agent header value
    pub user_agent: String,

    /// Time the render fetcher waits for client-side rendering to settle
    pub settle_delay: Duration,

    /// Browser executable for the render fetcher (auto-detected when unset)
    pub chrome_executable: Option<PathBuf>,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            max_pages: 500,
            per_page_timeout: Duration::from_secs(30),
            max_concurrent_fetches: 5,
            strategy: FetchStrategy::Direct,
            follow_links: true,
            respect_robots: true,
            allow_private_hosts: false,
            sitemap_max_depth: 8,
            max_redirects: 10,
            retry: RetryPolicy::default(),
            user_agent: default_user_agent(),
            settle_delay: Duration::from_millis(1500),
            chrome_executable: None,
        }
    }
}

impl CrawlOptions {
    /// Builds options from a validated configuration
    pub fn from_config(config: &Config) -> Self {
        let crawler = &config.crawler;
        let retry = &config.retry;

        Self {
            max_pages: crawler.max_pages,
            per_page_timeout: Duration::from_millis(crawler.per_page_timeout_ms),
            max_concurrent_fetches: crawler.max_concurrent_fetches,
            strategy: crawler.strategy,
            follow_links: crawler.follow_links,
            respect_robots: crawler.respect_robots,
            allow_private_hosts: crawler.allow_private_hosts,
            sitemap_max_depth: crawler.sitemap_max_depth,
            max_redirects: crawler.max_redirects,
            retry: RetryPolicy {
                max_attempts: retry.max_attempts,
                base_delay: Duration::from_millis(retry.base_delay_ms),
                max_delay: Duration::from_millis(retry.max_delay_ms),
            },
            user_agent: config.user_agent.header_value(),
            settle_delay: Duration::from_millis(config.render.settle_delay_ms),
            chrome_executable: config.render.chrome_executable.clone(),
        }
    }

    /// Product token used when matching robots.txt groups
    ///
    /// `SiteHarvest/1.0 (+https://...)` matches as `SiteHarvest`.
    pub fn robots_agent(&self) -> &str {
        self.user_agent
            .split(['/', ' '])
            .next()
            .filter(|token| !token.is_empty())
            .unwrap_or("*")
    }

    /// Upper bound on queued plus in-flight targets
    pub(crate) fn queue_bound(&self) -> usize {
        self.max_pages.saturating_mul(QUEUE_HEADROOM).max(self.max_pages + 1)
    }
}

/// Queue capacity as a multiple of `max_pages`
const QUEUE_HEADROOM: usize = 4;

/// User agent used when none is configured
pub fn default_user_agent() -> String {
    format!("SiteHarvest/{}", env!("CARGO_PKG_VERSION"))
}
