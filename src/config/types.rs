use crate::crawler::FetchStrategy;
use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for Site-Harvest
///
/// Every section is optional; missing sections and keys take their defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub retry: RetryConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub render: RenderConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum number of pages in the result set
    #[serde(rename = "max-pages")]
    pub max_pages: usize,

    /// Deadline for each page fetch (milliseconds)
    #[serde(rename = "per-page-timeout-ms")]
    pub per_page_timeout_ms: u64,

    /// Number of concurrent fetch workers
    #[serde(rename = "max-concurrent-fetches")]
    pub max_concurrent_fetches: usize,

    pub strategy: FetchStrategy,

    #[serde(rename = "follow-links")]
    pub follow_links: bool,

    #[serde(rename = "respect-robots")]
    pub respect_robots: bool,

    /// Disables the SSRF guard
    #[serde(rename = "allow-private-hosts")]
    pub allow_private_hosts: bool,

    /// Maximum nesting of sitemap indexes
    #[serde(rename = "sitemap-max-depth")]
    pub sitemap_max_depth: usize,

    #[serde(rename = "max-redirects")]
    pub max_redirects: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: 500,
            per_page_timeout_ms: 30_000,
            max_concurrent_fetches: 5,
            strategy: FetchStrategy::Direct,
            follow_links: true,
            respect_robots: true,
            allow_private_hosts: false,
            sitemap_max_depth: 8,
            max_redirects: 10,
        }
    }
}

/// Retry behavior for transient request failures
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per request, the first one included
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    #[serde(rename = "base-delay-ms")]
    pub base_delay_ms: u64,

    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 5_000,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: Option<String>,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "SiteHarvest".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: None,
        }
    }
}

impl UserAgentConfig {
    /// Full User-Agent header value
    ///
    /// # Examples
    ///
    /// ```
    /// use site_harvest::config::UserAgentConfig;
    ///
    /// let agent = UserAgentConfig {
    ///     crawler_name: "Audit".to_string(),
    ///     crawler_version: "2.1".to_string(),
    ///     contact_url: Some("https://example.com/bot".to_string()),
    /// };
    /// assert_eq!(agent.header_value(), "Audit/2.1 (+https://example.com/bot)");
    /// ```
    pub fn header_value(&self) -> String {
        match &self.contact_url {
            Some(contact) => format!("{}/{} (+{})", self.crawler_name, self.crawler_version, contact),
            None => format!("{}/{}", self.crawler_name, self.crawler_version),
        }
    }
}

/// Headless browser settings for the render strategy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Time allowed for client-side rendering after navigation (milliseconds)
    #[serde(rename = "settle-delay-ms")]
    pub settle_delay_ms: u64,

    /// Browser executable; auto-detected when unset
    #[serde(rename = "chrome-executable")]
    pub chrome_executable: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 1_500,
            chrome_executable: None,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path to the markdown summary file
    #[serde(rename = "summary-path")]
    pub summary_path: Option<PathBuf>,
}
