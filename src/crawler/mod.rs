//! Crawler module for page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry logic and manual redirect handling
//! - Optional headless-browser rendering (`render` feature)
//! - HTML parsing and link extraction
//! - The crawl frontier (priority queue plus visited set)
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod options;
mod parser;
mod retry;
mod scheduler;

#[cfg(feature = "render")]
mod render;

pub use coordinator::{crawl, Coordinator};
pub use fetcher::{build_http_client, is_html_content_type, FetchResult, HttpFetcher, PageFetcher};
pub use options::{default_user_agent, CrawlOptions, FetchStrategy};
pub use parser::{extract_links, extract_title, parse_html, ExtractOptions, ParsedPage};
pub use retry::{send_with_retry, RetryPolicy, SendError};
pub use scheduler::{Admission, CrawlTarget, DiscoverySource, Frontier};

#[cfg(feature = "render")]
pub use render::RenderFetcher;
