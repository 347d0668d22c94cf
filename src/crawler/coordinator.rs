//! Crawler coordinator - main crawl orchestration logic
//!
//! This module drives one crawl through its phases:
//! - Init: validating the root URL and choosing the fetch strategy
//! - Discovering: finding and resolving the sitemap
//! - Seeding: building the initial queue (root first, then sitemap URLs)
//! - Draining: a fixed pool of workers fetching pages and admitting extracted links
//! - Done: the last-resort root fetch and final statistics

use crate::crawler::fetcher::{FetchResult, HttpFetcher, PageFetcher};
use crate::crawler::parser::{parse_html, ExtractOptions};
use crate::crawler::scheduler::{Admission, CrawlTarget, DiscoverySource, Frontier};
use crate::crawler::{CrawlOptions, FetchStrategy};
use crate::output::{ContentKind, CrawlReport, CrawlStatistics, ErrorStage, FetchedPage};
use crate::robots::ParsedRobots;
use crate::sitemap::SitemapResolver;
use crate::state::CrawlPhase;
use crate::url::{canonicalize, guard, is_crawlable_canonical, with_default_scheme, CanonicalUrl, SitePolicy};
use crate::{HarvestError, Result, UrlError};
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Log a progress line every this many fetched pages
const PROGRESS_INTERVAL: usize = 10;

/// How long an idle worker waits before re-checking the queue
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Main crawler coordinator structure
pub struct Coordinator {
    root: CanonicalUrl,
    policy: SitePolicy,
    options: CrawlOptions,
    fetcher: Arc<dyn PageFetcher>,
    direct: Arc<HttpFetcher>,
    resolver: SitemapResolver,
    cancel: CancellationToken,
    phase: CrawlPhase,
}

impl Coordinator {
    /// Creates a coordinator using the fetch strategy named in `options`
    ///
    /// # Arguments
    ///
    /// * `root` - The site's root URL (`https://` is assumed when no scheme is given)
    /// * `options` - Crawl options
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Root is valid and safe, fetcher is ready
    /// * `Err(HarvestError)` - Malformed or unsafe root, or the fetcher could not be built
    pub async fn new(root: &str, options: CrawlOptions) -> Result<Self> {
        let (policy, root) = validate_root(root, &options).await?;
        let direct = Arc::new(HttpFetcher::new(&options)?);

        let fetcher: Arc<dyn PageFetcher> = match options.strategy {
            FetchStrategy::Direct => direct.clone(),
            #[cfg(feature = "render")]
            FetchStrategy::Render => Arc::new(crate::crawler::RenderFetcher::launch(&options).await?),
            #[cfg(not(feature = "render"))]
            FetchStrategy::Render => {
                return Err(HarvestError::Browser(
                    "the render strategy requires building with the `render` feature".to_string(),
                ))
            }
        };

        Self::assemble(root, policy, options, fetcher, direct)
    }

    /// Creates a coordinator around a caller-supplied page fetcher
    ///
    /// `options.strategy` is ignored; the last-resort root fetch still uses
    /// the direct HTTP fetcher.
    pub async fn with_fetcher(root: &str, options: CrawlOptions, fetcher: Arc<dyn PageFetcher>) -> Result<Self> {
        let (policy, root) = validate_root(root, &options).await?;
        let direct = Arc::new(HttpFetcher::new(&options)?);
        Self::assemble(root, policy, options, fetcher, direct)
    }

    fn assemble(
        root: CanonicalUrl,
        policy: SitePolicy,
        options: CrawlOptions,
        fetcher: Arc<dyn PageFetcher>,
        direct: Arc<HttpFetcher>,
    ) -> Result<Self> {
        let resolver = SitemapResolver::from_options(&options)?;

        Ok(Self {
            root,
            policy,
            options,
            fetcher,
            direct,
            resolver,
            cancel: CancellationToken::new(),
            phase: CrawlPhase::Init,
        })
    }

    /// Token that stops the crawl when cancelled
    ///
    /// Cancellation stops admission and scheduling; fetches already in
    /// flight finish and their pages are kept.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// The canonical root URL
    pub fn root(&self) -> &CanonicalUrl {
        &self.root
    }

    pub fn policy(&self) -> &SitePolicy {
        &self.policy
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    /// Runs the crawl to completion
    ///
    /// Never fails: every failure inside the crawl is recorded in the
    /// returned statistics.
    pub async fn run(mut self) -> CrawlReport {
        let clock = Instant::now();
        let mut stats = CrawlStatistics::new(self.fetcher.name());

        tracing::info!(
            "Starting crawl of {} ({} strategy, max {} pages, {} workers)",
            self.root,
            self.fetcher.name(),
            self.options.max_pages,
            self.options.max_concurrent_fetches
        );

        // Discovering
        self.advance(CrawlPhase::Discovering);
        let discovery = self.resolver.discover_with_robots(self.root.as_url()).await;
        let robots = if self.options.respect_robots {
            discovery.robots
        } else {
            None
        };

        let mut candidates = Vec::new();
        if let Some(sitemap) = discovery.sitemap {
            stats.sitemap_found = true;
            stats.sitemap_url = Some(sitemap.to_string());

            let resolution = self.resolver.resolve(&sitemap).await;
            stats.sitemap_url_count = resolution.urls.len();
            for failure in resolution.errors {
                stats.record_error(failure.url, ErrorStage::Sitemap, failure.message);
            }
            candidates = resolution.urls;
        }

        // Seeding
        self.advance(CrawlPhase::Seeding);
        let frontier = self.seed(&candidates, robots.as_ref(), &mut stats);
        tracing::info!(
            "Seeded {} targets ({} sitemap candidates)",
            frontier.queued(),
            candidates.len()
        );

        // Draining
        self.advance(CrawlPhase::Draining);
        let shared = Arc::new(Shared {
            frontier: Mutex::new(frontier),
            pages: Mutex::new(Vec::new()),
            stats: Mutex::new(stats),
            wake: Notify::new(),
            fetcher: self.fetcher.clone(),
            policy: self.policy.clone(),
            options: self.options.clone(),
            robots,
            root: self.root.clone(),
            cancel: self.cancel.clone(),
            started: clock,
        });

        let workers: Vec<_> = (0..self.options.max_concurrent_fetches.max(1))
            .map(|id| tokio::spawn(run_worker(id, shared.clone())))
            .collect();

        for (id, worker) in workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                tracing::error!("Worker {} failed: {}", id, e);
            }
        }

        // Done
        self.advance(CrawlPhase::Done);
        let mut pages = std::mem::take(&mut *lock(&shared.pages));
        let mut stats = lock(&shared.stats).clone();
        stats.cancelled = self.cancel.is_cancelled();

        if pages.is_empty() && !stats.cancelled {
            if let Some(page) = self.fetch_root_directly(&mut stats).await {
                stats.used_root_fallback = true;
                pages.push(page);
            }
        }

        stats.total_fetched = pages.len();
        stats.finished_at = Some(Utc::now());
        stats.elapsed = clock.elapsed();

        tracing::info!(
            "Crawl finished: {} pages, {} errors in {:.1}s",
            stats.total_fetched,
            stats.errors.len(),
            stats.elapsed.as_secs_f64()
        );

        CrawlReport {
            pages,
            statistics: stats,
        }
    }

    fn advance(&mut self, next: CrawlPhase) {
        match self.phase.transition(next) {
            Ok(phase) => {
                tracing::debug!("Crawl phase {} -> {}", self.phase, phase);
                self.phase = phase;
            }
            Err(e) => tracing::error!("{}", e),
        }
    }

    /// Builds the initial queue: the root, then sitemap candidates in order,
    /// up to `max_pages` targets
    fn seed(&self, candidates: &[String], robots: Option<&ParsedRobots>, stats: &mut CrawlStatistics) -> Frontier {
        let mut frontier = Frontier::new(self.options.queue_bound());
        let agent = self.options.robots_agent();

        frontier.admit(CrawlTarget::new(self.root.clone(), DiscoverySource::Root));
        let mut admitted = 1;

        for raw in candidates {
            if admitted >= self.options.max_pages {
                tracing::debug!("Seed limit of {} reached", self.options.max_pages);
                break;
            }

            let Some(canonical) = canonicalize(raw, Some(self.root.as_url()), &self.policy) else {
                continue;
            };
            if !is_crawlable_canonical(&canonical, &self.policy) {
                tracing::trace!("Skipping sitemap entry {}", raw);
                continue;
            }
            if frontier.is_visited(&canonical) {
                stats.duplicates_skipped += 1;
                continue;
            }
            if !robots_allows(robots, &self.root, &canonical, agent) {
                tracing::debug!("Disallowed by robots.txt: {}", canonical);
                stats.robots_blocked += 1;
                frontier.mark_visited(canonical);
                continue;
            }

            match frontier.admit(CrawlTarget::new(canonical, DiscoverySource::Sitemap)) {
                Admission::Admitted => admitted += 1,
                Admission::Duplicate => stats.duplicates_skipped += 1,
                Admission::Discarded => stats.queue_discarded += 1,
            }
        }

        stats.total_discovered = admitted;
        frontier
    }

    /// One direct fetch of the root after an empty crawl
    async fn fetch_root_directly(&self, stats: &mut CrawlStatistics) -> Option<FetchedPage> {
        tracing::warn!("No pages were fetched; trying {} directly", self.root);

        let timeout = self.options.per_page_timeout;
        let result = tokio::time::timeout(timeout, self.direct.fetch(self.root.as_url(), timeout))
            .await
            .unwrap_or(FetchResult::Timeout);

        let (final_url, status_code, content_type, body) = match result {
            FetchResult::Success {
                final_url,
                status_code,
                content_type,
                body,
            } => (final_url, status_code, content_type, body),
            failure => {
                stats.record_error(
                    self.root.as_str(),
                    ErrorStage::Fetch,
                    format!("last-resort fetch failed: {}", failure.describe()),
                );
                return None;
            }
        };

        let landed = canonicalize(final_url.as_str(), None, &self.policy)
            .filter(|url| is_crawlable_canonical(url, &self.policy));
        let Some(landed) = landed else {
            stats.record_error(
                self.root.as_str(),
                ErrorStage::Redirect,
                format!("root redirected off-site to {}", final_url),
            );
            return None;
        };

        let parsed = parse_html(&body, &final_url, &self.policy, ExtractOptions { script_sweep: false });
        Some(FetchedPage {
            url: landed,
            requested_url: self.root.clone(),
            final_url: final_url.to_string(),
            kind: ContentKind::from_content_type(&content_type),
            body,
            status: status_code,
            content_type,
            title: parsed.title,
            source: DiscoverySource::Root,
            fetched_at: Utc::now(),
        })
    }
}

/// Crawls a site
///
/// # Arguments
///
/// * `root_url` - The site's root URL
/// * `options` - Crawl options
///
/// # Returns
///
/// * `Ok(CrawlReport)` - Pages and statistics; in-crawl failures are in `statistics.errors`
/// * `Err(HarvestError)` - The root URL was malformed or unsafe, or the fetcher could not be built
///
/// # Example
///
/// ```no_run
/// # async fn run() -> site_harvest::Result<()> {
/// use site_harvest::{crawl, CrawlOptions};
///
/// let report = crawl("https://example.com", CrawlOptions::default()).await?;
/// println!("{} pages", report.pages.len());
/// # Ok(())
/// # }
/// ```
pub async fn crawl(root_url: &str, options: CrawlOptions) -> Result<CrawlReport> {
    let coordinator = Coordinator::new(root_url, options).await?;
    Ok(coordinator.run().await)
}

/// Validates, canonicalizes and SSRF-checks the root
async fn validate_root(root: &str, options: &CrawlOptions) -> Result<(SitePolicy, CanonicalUrl)> {
    let policy = SitePolicy::from_root(root)?.with_private_hosts(options.allow_private_hosts);

    let canonical = canonicalize(&with_default_scheme(root), None, &policy)
        .ok_or_else(|| UrlError::Malformed(format!("cannot canonicalize root URL {}", root)))?;

    if !options.allow_private_hosts {
        guard::check_resolved(canonical.as_url())
            .await
            .map_err(HarvestError::InvalidRoot)?;
    }

    Ok((policy, canonical))
}

/// robots.txt admission check; the root is always allowed
fn robots_allows(robots: Option<&ParsedRobots>, root: &CanonicalUrl, url: &CanonicalUrl, agent: &str) -> bool {
    if url == root {
        return true;
    }
    robots.map_or(true, |robots| robots.is_allowed(url.as_str(), agent))
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared by the workers of one crawl
struct Shared {
    frontier: Mutex<Frontier>,
    pages: Mutex<Vec<FetchedPage>>,
    stats: Mutex<CrawlStatistics>,
    wake: Notify,
    fetcher: Arc<dyn PageFetcher>,
    policy: SitePolicy,
    options: CrawlOptions,
    robots: Option<ParsedRobots>,
    root: CanonicalUrl,
    cancel: CancellationToken,
    started: Instant,
}

impl Shared {
    fn is_full(&self) -> bool {
        lock(&self.pages).len() >= self.options.max_pages
    }

    fn record_error(&self, url: &str, stage: ErrorStage, message: String) {
        tracing::warn!("{} failed ({}): {}", url, stage, message);
        lock(&self.stats).record_error(url, stage, message);
    }

    /// Fetches one target and records the outcome
    async fn process(&self, target: CrawlTarget) {
        let timeout = self.options.per_page_timeout;
        let result = tokio::time::timeout(timeout, self.fetcher.fetch(target.url.as_url(), timeout))
            .await
            .unwrap_or(FetchResult::Timeout);

        let (final_url, status_code, content_type, body) = match result {
            FetchResult::Success {
                final_url,
                status_code,
                content_type,
                body,
            } => (final_url, status_code, content_type, body),
            FetchResult::RedirectError { error } => {
                self.record_error(target.url.as_str(), ErrorStage::Redirect, error);
                return;
            }
            FetchResult::Blocked { reason } => {
                self.record_error(target.url.as_str(), ErrorStage::Redirect, format!("blocked target: {}", reason));
                return;
            }
            failure => {
                self.record_error(target.url.as_str(), ErrorStage::Fetch, failure.describe());
                return;
            }
        };

        let Some(landed) = self.landing_url(&target, &final_url) else {
            return;
        };

        let parsed = parse_html(
            &body,
            &final_url,
            &self.policy,
            ExtractOptions {
                script_sweep: !self.fetcher.renders_dom(),
            },
        );

        let page = FetchedPage {
            url: landed,
            requested_url: target.url.clone(),
            final_url: final_url.to_string(),
            kind: ContentKind::from_content_type(&content_type),
            body,
            status: status_code,
            content_type,
            title: parsed.title,
            source: target.source,
            fetched_at: Utc::now(),
        };

        let fetched = {
            let mut pages = lock(&self.pages);
            if pages.len() >= self.options.max_pages {
                None
            } else {
                pages.push(page);
                Some(pages.len())
            }
        };

        let Some(fetched) = fetched else {
            tracing::debug!("Page limit reached, dropping {}", target.url);
            return;
        };

        if fetched % PROGRESS_INTERVAL == 0 {
            self.log_progress(fetched);
        }

        if fetched >= self.options.max_pages {
            let dropped = lock(&self.frontier).clear_queue();
            tracing::info!(
                "Reached {} pages, stopping ({} queued targets dropped)",
                fetched,
                dropped
            );
            self.wake.notify_waiters();
            return;
        }

        if self.options.follow_links && !self.cancel.is_cancelled() {
            self.admit_links(parsed.links);
        }
    }

    /// Resolves where a fetch actually landed
    ///
    /// Returns `None` (after recording why) when the destination is off-site
    /// or was already claimed by another target.
    fn landing_url(&self, target: &CrawlTarget, final_url: &Url) -> Option<CanonicalUrl> {
        let Some(landed) = canonicalize(final_url.as_str(), None, &self.policy) else {
            self.record_error(
                target.url.as_str(),
                ErrorStage::Redirect,
                format!("unusable final URL {}", final_url),
            );
            return None;
        };

        if landed == target.url {
            return Some(landed);
        }

        if !is_crawlable_canonical(&landed, &self.policy) {
            self.record_error(
                target.url.as_str(),
                ErrorStage::Redirect,
                format!("redirected off-site to {}", final_url),
            );
            return None;
        }

        if !lock(&self.frontier).mark_visited(landed.clone()) {
            tracing::debug!("{} redirected to already visited {}", target.url, landed);
            lock(&self.stats).duplicates_skipped += 1;
            return None;
        }

        Some(landed)
    }

    /// Admits extracted links as html-link targets
    fn admit_links(&self, links: Vec<CanonicalUrl>) {
        let agent = self.options.robots_agent();
        let (mut admitted, mut duplicates, mut blocked, mut discarded) = (0, 0, 0, 0);

        {
            let mut frontier = lock(&self.frontier);
            for link in links {
                if frontier.is_visited(&link) {
                    duplicates += 1;
                    continue;
                }
                if !robots_allows(self.robots.as_ref(), &self.root, &link, agent) {
                    tracing::debug!("Disallowed by robots.txt: {}", link);
                    blocked += 1;
                    frontier.mark_visited(link);
                    continue;
                }
                match frontier.admit(CrawlTarget::new(link, DiscoverySource::HtmlLink)) {
                    Admission::Admitted => admitted += 1,
                    Admission::Duplicate => duplicates += 1,
                    Admission::Discarded => discarded += 1,
                }
            }
        }

        {
            let mut stats = lock(&self.stats);
            stats.html_discovered_count += admitted;
            stats.total_discovered += admitted;
            stats.duplicates_skipped += duplicates;
            stats.robots_blocked += blocked;
            stats.queue_discarded += discarded;
        }

        if admitted > 0 {
            tracing::trace!("Admitted {} new links", admitted);
            self.wake.notify_waiters();
        }
    }

    fn log_progress(&self, fetched: usize) {
        let (queued, in_flight) = {
            let frontier = lock(&self.frontier);
            (frontier.queued(), frontier.in_flight())
        };
        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 { fetched as f64 / elapsed } else { 0.0 };

        tracing::info!(
            "Progress: {} pages fetched, {} queued, {} in flight ({:.1} pages/sec)",
            fetched,
            queued,
            in_flight,
            rate
        );
    }
}

/// Worker loop: take a target, process it, repeat until the queue drains,
/// the page limit is hit or the crawl is cancelled
async fn run_worker(id: usize, shared: Arc<Shared>) {
    loop {
        if shared.cancel.is_cancelled() || shared.is_full() {
            break;
        }

        let next = {
            let mut frontier = lock(&shared.frontier);
            match frontier.next_target() {
                Some(target) => Some(target),
                None if frontier.in_flight() == 0 => break,
                None => None,
            }
        };

        let Some(target) = next else {
            tokio::select! {
                _ = shared.wake.notified() => {}
                _ = tokio::time::sleep(IDLE_POLL) => {}
                _ = shared.cancel.cancelled() => {}
            }
            continue;
        };

        tracing::debug!("Worker {} fetching {} ({})", id, target.url, target.source);
        let url = target.url.to_string();
        if let Err(payload) = AssertUnwindSafe(shared.process(target)).catch_unwind().await {
            shared.record_error(&url, ErrorStage::Fetch, format!("fetch panicked: {}", panic_message(&*payload)));
        }

        // Runs even when the fetch panicked, otherwise the pool never drains
        lock(&shared.frontier).complete();
        shared.wake.notify_waiters();
    }

    tracing::trace!("Worker {} finished", id);
    shared.wake.notify_waiters();
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
