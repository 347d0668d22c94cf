//! Sitemap discovery and resolution
//!
//! This module finds a site's sitemap and flattens sitemap trees into page
//! URL lists:
//! - Probing conventional sitemap locations
//! - Falling back to `Sitemap:` directives in robots.txt
//! - Parsing `<urlset>` and `<sitemapindex>` documents
//! - Recursive, cycle-safe resolution of sitemap indexes

mod parser;
mod resolver;

pub use parser::{parse_sitemap_document, SitemapDocument};
pub use resolver::{build_sitemap_client, SitemapFailure, SitemapResolution, SitemapResolver, MIN_SITEMAP_DEPTH};

use crate::robots::{fetch_robots, ParsedRobots};
use futures::future::join_all;
use url::Url;

/// Conventional sitemap locations, probed in this order of preference
pub const SITEMAP_PATHS: &[&str] = &[
    "/sitemap.xml",
    "/sitemap_index.xml",
    "/sitemap-index.xml",
    "/sitemap/sitemap.xml",
    "/sitemaps.xml",
    "/sitemap/index.xml",
    "/wp-sitemap.xml",
    "/sitemap.php",
];

/// Outcome of sitemap discovery
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// The chosen sitemap, if any
    pub sitemap: Option<Url>,
    /// robots.txt, when the site serves one
    pub robots: Option<ParsedRobots>,
}

impl SitemapResolver {
    /// Finds the site's sitemap
    ///
    /// # Returns
    ///
    /// * `Some(Url)` - The first conventional location that answers 200, or
    ///   else the first robots.txt `Sitemap:` entry that answers 200
    /// * `None` - The site has no discoverable sitemap
    pub async fn discover(&self, root: &Url) -> Option<Url> {
        self.discover_with_robots(root).await.sitemap
    }

    /// Finds the site's sitemap and returns the robots.txt fetched on the way
    ///
    /// All conventional locations are probed concurrently together with the
    /// robots.txt fetch; the winner is the earliest location in
    /// [`SITEMAP_PATHS`] that exists, regardless of which probe answered first.
    pub async fn discover_with_robots(&self, root: &Url) -> Discovery {
        let candidates: Vec<Url> = SITEMAP_PATHS
            .iter()
            .filter_map(|path| root.join(path).ok())
            .collect();

        let probes = join_all(candidates.iter().map(|candidate| self.exists(candidate)));
        let robots = fetch_robots(&self.client, root, &self.retry);
        let (found, robots) = tokio::join!(probes, robots);

        let conventional = candidates
            .into_iter()
            .zip(found)
            .find_map(|(candidate, exists)| exists.then_some(candidate));

        if let Some(sitemap) = conventional {
            tracing::info!("Found sitemap at {}", sitemap);
            return Discovery {
                sitemap: Some(sitemap),
                robots,
            };
        }

        let declared = robots
            .as_ref()
            .map(|parsed| parsed.sitemaps().to_vec())
            .unwrap_or_default();

        for entry in declared {
            let Ok(candidate) = root.join(&entry) else {
                tracing::debug!("Ignoring unparsable robots.txt sitemap {:?}", entry);
                continue;
            };
            if self.exists(&candidate).await {
                tracing::info!("Found sitemap via robots.txt at {}", candidate);
                return Discovery {
                    sitemap: Some(candidate),
                    robots,
                };
            }
        }

        tracing::info!("No sitemap found for {}", root);
        Discovery { sitemap: None, robots }
    }
}
