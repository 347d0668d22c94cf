//! Crawl statistics
//!
//! This module defines the counters and error records gathered during a
//! crawl and prints them in a readable form.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Crawl stage in which an error was absorbed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorStage {
    /// A sitemap or sitemap index could not be fetched
    Sitemap,
    /// A page fetch failed (HTTP error, network error, timeout, non-HTML)
    Fetch,
    /// A redirect failed or led off the site
    Redirect,
}

impl ErrorStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorStage::Sitemap => "sitemap",
            ErrorStage::Fetch => "fetch",
            ErrorStage::Redirect => "redirect",
        }
    }
}

impl fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error information for one failed target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlError {
    /// The URL that failed
    pub url: String,

    pub stage: ErrorStage,

    /// Error message
    pub message: String,
}

/// Crawl statistics summary
#[derive(Debug, Clone)]
pub struct CrawlStatistics {
    /// Whether a sitemap was found
    pub sitemap_found: bool,

    /// Location of the sitemap that was used
    pub sitemap_url: Option<String>,

    /// Page URLs listed by the sitemap tree (deduplicated, before filtering)
    pub sitemap_url_count: usize,

    /// Targets admitted from link extraction
    pub html_discovered_count: usize,

    /// Unique targets admitted from every source, root included
    pub total_discovered: usize,

    /// Pages in the result set
    pub total_fetched: usize,

    /// Every absorbed failure, in the order it happened
    pub errors: Vec<CrawlError>,

    /// Candidates or redirect destinations dropped because they were already visited
    pub duplicates_skipped: usize,

    /// Candidates dropped by robots.txt rules
    pub robots_blocked: usize,

    /// Candidates dropped at the queue bound
    pub queue_discarded: usize,

    /// Fetch strategy that produced the pages
    pub strategy: String,

    /// True when the crawl was cancelled before the queue drained
    pub cancelled: bool,

    /// True when the result came from the last-resort root fetch
    pub used_root_fallback: bool,

    pub started_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,

    pub elapsed: Duration,
}

impl CrawlStatistics {
    /// Creates empty statistics for a crawl starting now
    pub fn new(strategy: &str) -> Self {
        Self {
            sitemap_found: false,
            sitemap_url: None,
            sitemap_url_count: 0,
            html_discovered_count: 0,
            total_discovered: 0,
            total_fetched: 0,
            errors: Vec::new(),
            duplicates_skipped: 0,
            robots_blocked: 0,
            queue_discarded: 0,
            strategy: strategy.to_string(),
            cancelled: false,
            used_root_fallback: false,
            started_at: Utc::now(),
            finished_at: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Records an absorbed failure
    pub fn record_error(&mut self, url: impl Into<String>, stage: ErrorStage, message: impl Into<String>) {
        self.errors.push(CrawlError {
            url: url.into(),
            stage,
            message: message.into(),
        });
    }

    /// Error counts grouped by stage
    pub fn errors_by_stage(&self) -> BTreeMap<ErrorStage, usize> {
        let mut counts = BTreeMap::new();
        for error in &self.errors {
            *counts.entry(error.stage).or_insert(0) += 1;
        }
        counts
    }

    /// Share of admitted targets that ended up in the result set, in percent
    pub fn success_rate(&self) -> f64 {
        if self.total_discovered == 0 {
            return 0.0;
        }
        (self.total_fetched as f64 / self.total_discovered as f64) * 100.0
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Strategy: {}", stats.strategy);
    match &stats.sitemap_url {
        Some(url) => println!("  Sitemap: {} ({} URLs)", url, stats.sitemap_url_count),
        None => println!("  Sitemap: none found"),
    }
    println!("  Discovered via links: {}", stats.html_discovered_count);
    println!("  Total discovered: {}", stats.total_discovered);
    println!("  Pages fetched: {}", stats.total_fetched);
    println!("  Elapsed: {:.1}s", stats.elapsed.as_secs_f64());
    println!();

    println!("Skipped:");
    println!("  Duplicates: {}", stats.duplicates_skipped);
    println!("  Blocked by robots.txt: {}", stats.robots_blocked);
    println!("  Discarded at queue bound: {}", stats.queue_discarded);
    println!();

    if !stats.errors.is_empty() {
        println!("Errors ({}):", stats.errors.len());
        for (stage, count) in stats.errors_by_stage() {
            println!("  {}: {}", stage, count);
        }
        for error in stats.errors.iter().take(20) {
            println!("  - [{}] {}: {}", error.stage, error.url, error.message);
        }
        if stats.errors.len() > 20 {
            println!("  ... and {} more", stats.errors.len() - 20);
        }
        println!();
    }

    if stats.cancelled {
        println!("Crawl was cancelled before the queue drained.");
    }
    if stats.used_root_fallback {
        println!("No page was reachable through the queue; the root was fetched directly.");
    }

    println!(
        "Success Rate: {:.1}% ({} / {} discovered pages fetched)",
        stats.success_rate(),
        stats.total_fetched,
        stats.total_discovered
    );
}
