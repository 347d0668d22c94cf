//! Robots.txt handling module
//!
//! This module provides functionality for fetching and parsing robots.txt.
//! The crawler reads `Sitemap:` directives from it during sitemap discovery
//! and optionally filters crawl candidates through its `Disallow` rules.

mod parser;

pub use parser::ParsedRobots;

use crate::crawler::{send_with_retry, RetryPolicy};
use reqwest::Client;
use url::Url;

/// Returns the robots.txt location for the site of `root`
pub fn robots_url(root: &Url) -> Option<Url> {
    root.join("/robots.txt").ok()
}

/// Fetches and parses robots.txt for the site of `root`
///
/// Returns `None` when the file is missing or cannot be fetched; a site
/// without robots.txt is a normal case, not an error.
pub async fn fetch_robots(client: &Client, root: &Url, retry: &RetryPolicy) -> Option<ParsedRobots> {
    let url = robots_url(root)?;
    let response = match send_with_retry(|| client.get(url.clone()), &url, retry).await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!("No robots.txt at {}: {}", url, e);
            return None;
        }
    };

    match response.text().await {
        Ok(body) => {
            let robots = ParsedRobots::from_content(&body);
            tracing::debug!(
                "Fetched robots.txt from {} ({} sitemap directives)",
                url,
                robots.sitemaps().len()
            );
            Some(robots)
        }
        Err(e) => {
            tracing::debug!("Failed to read robots.txt body from {}: {}", url, e);
            None
        }
    }
}
