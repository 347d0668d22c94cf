//! Output module for crawl results
//!
//! This module handles:
//! - The fetched page records handed to the caller
//! - The crawl report (pages plus statistics)
//! - Running per-page analyzers over a finished crawl
//! - Markdown summaries of a crawl

mod markdown;
pub mod stats;

pub use markdown::{format_markdown_summary, write_markdown_summary};
pub use stats::{print_statistics, CrawlError, CrawlStatistics, ErrorStage};

use crate::crawler::DiscoverySource;
use crate::url::CanonicalUrl;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Content classification of a fetched page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Html,
    Xhtml,
}

impl ContentKind {
    /// Classifies a Content-Type value; anything not XHTML is treated as HTML
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type
            .to_ascii_lowercase()
            .contains("application/xhtml+xml")
        {
            ContentKind::Xhtml
        } else {
            ContentKind::Html
        }
    }
}

/// A retrieved page
///
/// Immutable once created; one per canonical URL in a crawl.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// Canonical URL of the final (post-redirect) location
    pub url: CanonicalUrl,

    /// Canonical URL that was scheduled (differs from `url` after a redirect)
    pub requested_url: CanonicalUrl,

    /// Final URL exactly as the server reported it
    pub final_url: String,

    /// Raw document body
    pub body: String,

    /// HTTP status code
    pub status: u16,

    /// Content-Type header value
    pub content_type: String,

    pub kind: ContentKind,

    /// Page title (from <title> tag)
    pub title: Option<String>,

    /// How the page was discovered
    pub source: DiscoverySource,

    pub fetched_at: DateTime<Utc>,
}

/// Result of a crawl: pages in completion order plus statistics
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub pages: Vec<FetchedPage>,
    pub statistics: CrawlStatistics,
}

impl CrawlReport {
    /// Looks up a page by canonical URL string
    pub fn page(&self, url: &str) -> Option<&FetchedPage> {
        self.pages.iter().find(|page| page.url.as_str() == url)
    }

    /// Canonical URLs of every page, in result order
    pub fn urls(&self) -> Vec<&str> {
        self.pages.iter().map(|page| page.url.as_str()).collect()
    }

    /// Runs an analyzer over every page
    ///
    /// # Example
    ///
    /// ```no_run
    /// # async fn run() -> site_harvest::Result<()> {
    /// use site_harvest::{crawl, CrawlOptions};
    ///
    /// let report = crawl("https://example.com", CrawlOptions::default()).await?;
    /// let sizes = report.analyze(&|_url: &str, body: &str| body.len());
    /// # Ok(())
    /// # }
    /// ```
    pub fn analyze<A: PageAnalyzer + ?Sized>(&self, analyzer: &A) -> Vec<(String, A::Output)> {
        self.pages
            .iter()
            .map(|page| (page.url.to_string(), analyzer.analyze(page.url.as_str(), &page.body)))
            .collect()
    }
}

/// A stateless per-page check run over a finished crawl
///
/// Implemented for any `Fn(&str, &str) -> R` taking the canonical URL and
/// the document body.
pub trait PageAnalyzer {
    type Output;

    fn analyze(&self, url: &str, body: &str) -> Self::Output;
}

impl<F, R> PageAnalyzer for F
where
    F: Fn(&str, &str) -> R,
{
    type Output = R;

    fn analyze(&self, url: &str, body: &str) -> R {
        self(url, body)
    }
}
