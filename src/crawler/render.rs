//! Headless browser fetcher
//!
//! Loads each page in a fresh tab, waits for the network to go quiet and
//! client-side rendering to settle, then captures the resulting DOM, so links inserted by scripts show up as
//! ordinary anchors.

use crate::crawler::fetcher::{is_html_content_type, FetchResult, PageFetcher};
use crate::crawler::CrawlOptions;
use crate::HarvestError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{EventLifecycleEvent, SetLifecycleEventsEnabledParams};
use chromiumoxide::Page;
use futures::{future, Stream, StreamExt};
use std::pin::pin;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use url::Url;

/// Upper bound on the time kept back from a fetch's timeout for closing its tab
const CLOSE_RESERVE: Duration = Duration::from_secs(2);

/// Time kept back from the idle wait for reading the DOM
const IDLE_RESERVE: Duration = Duration::from_millis(250);

/// Page fetcher backed by a headless Chromium
pub struct RenderFetcher {
    browser: Browser,
    handler: JoinHandle<()>,
    settle_delay: Duration,
}

impl RenderFetcher {
    /// Launches the browser
    ///
    /// # Returns
    ///
    /// * `Ok(RenderFetcher)` - Browser is running and ready for pages
    /// * `Err(HarvestError::Browser)` - No usable browser could be launched
    pub async fn launch(options: &CrawlOptions) -> Result<Self, HarvestError> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(options.per_page_timeout)
            .window_size(1366, 900)
            .arg(format!("--user-agent={}", options.user_agent))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--mute-audio");

        if let Some(executable) = &options.chrome_executable {
            builder = builder.chrome_executable(executable);
        }

        let config = builder
            .build()
            .map_err(|e| HarvestError::Browser(format!("invalid browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| HarvestError::Browser(format!("failed to launch browser: {}", e)))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("Browser handler error: {}", e);
                }
            }
            tracing::debug!("Browser handler task completed");
        });

        tracing::info!("Headless browser launched");

        Ok(Self {
            browser,
            handler,
            settle_delay: options.settle_delay,
        })
    }

    async fn render(&self, page: &Page, url: &Url, deadline: Instant) -> Result<FetchResult, String> {
        let main_frame = page.mainframe().await.map_err(|e| e.to_string())?;
        if let Err(e) = page.execute(SetLifecycleEventsEnabledParams::new(true)).await {
            tracing::trace!("Could not enable lifecycle events for {}: {}", url, e);
        }

        // Subscribed before navigating so the new document's events are buffered
        let lifecycle = page
            .event_listener::<EventLifecycleEvent>()
            .await
            .map_err(|e| e.to_string())?;
        let events = lifecycle.filter_map(move |event| {
            let in_main_frame = main_frame.as_ref().map_or(true, |frame| *frame == event.frame_id);
            future::ready(in_main_frame.then(|| (event.name.clone(), event.loader_id.inner().clone())))
        });
        let events = pin!(events);

        page.goto(url.as_str()).await.map_err(|e| e.to_string())?;
        page.wait_for_navigation().await.map_err(|e| e.to_string())?;

        let idle_deadline = deadline
            .checked_sub(self.settle_delay + IDLE_RESERVE)
            .unwrap_or_else(Instant::now);
        match tokio::time::timeout_at(idle_deadline, wait_for_network_idle(events)).await {
            Ok(true) => tracing::trace!("Network idle on {}", url),
            Ok(false) => tracing::debug!("Lifecycle events for {} ended before network idle", url),
            Err(_) => tracing::debug!("Network still busy on {}, capturing anyway", url),
        }
        tokio::time::sleep(self.settle_delay).await;

        let content_type: String = page
            .evaluate("document.contentType")
            .await
            .map_err(|e| e.to_string())?
            .into_value()
            .unwrap_or_else(|_| "text/html".to_string());

        if !is_html_content_type(&content_type) {
            return Ok(FetchResult::ContentMismatch { content_type });
        }

        let final_url = page
            .url()
            .await
            .map_err(|e| e.to_string())?
            .and_then(|u| Url::parse(&u).ok())
            .unwrap_or_else(|| url.clone());

        let body = page.content().await.map_err(|e| e.to_string())?;

        // The DevTools navigation API does not surface the document status
        Ok(FetchResult::Success {
            final_url,
            status_code: 200,
            content_type,
            body,
        })
    }
}

/// Share of the caller's timeout the tab may use, leaving room to close it
fn tab_budget(timeout: Duration) -> Duration {
    timeout - (timeout / 10).min(CLOSE_RESERVE)
}

/// Waits until the main frame's current document reports `networkIdle`
///
/// Events are `(name, loader id)` pairs. Each `init` starts a new document,
/// so an idle signal only counts when it belongs to the latest one. Returns
/// `false` if the stream ends first.
async fn wait_for_network_idle<S>(mut events: S) -> bool
where
    S: Stream<Item = (String, String)> + Unpin,
{
    let mut current: Option<String> = None;
    while let Some((name, loader)) = events.next().await {
        match name.as_str() {
            "init" => current = Some(loader),
            "networkIdle" if current.as_deref() == Some(loader.as_str()) => return true,
            _ => {}
        }
    }
    false
}

/// Closes its tab when dropped unless [`TabGuard::close`] already did
struct TabGuard {
    page: Page,
    closed: bool,
}

impl TabGuard {
    fn new(page: Page) -> Self {
        Self { page, closed: false }
    }

    async fn close(mut self, url: &Url) {
        self.closed = true;
        if let Err(e) = self.page.clone().close().await {
            tracing::debug!("Failed to close tab for {}: {}", url, e);
        }
    }
}

impl Drop for TabGuard {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let page = self.page.clone();
        if let Ok(runtime) = Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = page.close().await {
                    tracing::debug!("Failed to close abandoned tab: {}", e);
                }
            });
        }
    }
}

#[async_trait]
impl PageFetcher for RenderFetcher {
    async fn fetch(&self, url: &Url, timeout: Duration) -> FetchResult {
        let deadline = Instant::now() + tab_budget(timeout);

        let page = match tokio::time::timeout_at(deadline, self.browser.new_page("about:blank")).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                return FetchResult::NetworkError {
                    error: format!("failed to open tab: {}", e),
                }
            }
            Err(_) => return FetchResult::Timeout,
        };
        let tab = TabGuard::new(page);

        let result = match tokio::time::timeout_at(deadline, self.render(&tab.page, url, deadline)).await {
            Ok(Ok(result)) => result,
            Ok(Err(error)) => FetchResult::NetworkError { error },
            Err(_) => FetchResult::Timeout,
        };

        tab.close(url).await;
        result
    }

    fn name(&self) -> &'static str {
        "render"
    }

    fn renders_dom(&self) -> bool {
        true
    }
}

impl Drop for RenderFetcher {
    fn drop(&mut self) {
        self.handler.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn event(name: &str, loader: &str) -> (String, String) {
        (name.to_string(), loader.to_string())
    }

    #[tokio::test]
    async fn test_idle_after_init() {
        let events = stream::iter(vec![
            event("init", "L1"),
            event("DOMContentLoaded", "L1"),
            event("load", "L1"),
            event("networkIdle", "L1"),
        ]);
        assert!(wait_for_network_idle(events).await);
    }

    #[tokio::test]
    async fn test_idle_from_previous_document_ignored() {
        let events = stream::iter(vec![
            event("init", "blank"),
            event("networkIdle", "blank"),
            event("init", "L2"),
            event("networkIdle", "blank"),
            event("load", "L2"),
        ]);
        assert!(!wait_for_network_idle(events).await);

        let events = stream::iter(vec![
            event("init", "blank"),
            event("init", "L2"),
            event("networkIdle", "blank"),
            event("networkIdle", "L2"),
        ]);
        assert!(wait_for_network_idle(events).await);
    }

    #[tokio::test]
    async fn test_idle_before_any_init_ignored() {
        let events = stream::iter(vec![event("networkIdle", "L1"), event("load", "L1")]);
        assert!(!wait_for_network_idle(events).await);
    }

    #[tokio::test]
    async fn test_busy_network_hits_deadline() {
        let events = stream::iter(vec![event("init", "L1")]).chain(stream::pending());
        let waited = tokio::time::timeout(Duration::from_millis(50), wait_for_network_idle(events)).await;
        assert!(waited.is_err());
    }

    #[test]
    fn test_tab_budget_leaves_time_to_close() {
        assert_eq!(tab_budget(Duration::from_secs(30)), Duration::from_secs(28));
        assert_eq!(tab_budget(Duration::from_secs(5)), Duration::from_millis(4500));
        assert_eq!(tab_budget(Duration::ZERO), Duration::ZERO);
        assert!(tab_budget(Duration::from_millis(100)) < Duration::from_millis(100));
    }
}
