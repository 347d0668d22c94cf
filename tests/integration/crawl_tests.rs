//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end.

use async_trait::async_trait;
use site_harvest::crawler::{DiscoverySource, FetchResult, PageFetcher, RetryPolicy};
use site_harvest::output::ErrorStage;
use site_harvest::{crawl, Coordinator, CrawlOptions};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Options suited to a local mock server
fn test_options() -> CrawlOptions {
    CrawlOptions {
        allow_private_hosts: true,
        per_page_timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        },
        ..Default::default()
    }
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html")
}

async fn mount_page(server: &MockServer, page_path: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(page_path))
        .respond_with(html(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_crawl_follows_links_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html(
            r#"<html><head><title>Home</title></head><body>
            <a href="/a">A</a>
            <a href="/b">B</a>
            <a href="/a/">A with slash</a>
            <a href="/a#section">A fragment</a>
            </body></html>"#,
        ))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/a"))
        .respond_with(html(r#"<a href="/b">B</a><a href="/">Home</a>"#))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(html("<title>Page B</title>"))
        .expect(1)
        .mount(&server)
        .await;

    let root = server.uri();
    let report = crawl(&root, test_options()).await.unwrap();

    let mut urls = report.urls();
    urls.sort();
    assert_eq!(
        urls,
        vec![
            format!("{}/", root),
            format!("{}/a", root),
            format!("{}/b", root)
        ]
    );

    let stats = &report.statistics;
    assert!(!stats.sitemap_found);
    assert_eq!(stats.total_fetched, 3);
    assert_eq!(stats.html_discovered_count, 2);
    assert!(stats.errors.is_empty());

    let home = report.page(&format!("{}/", root)).unwrap();
    assert_eq!(home.title.as_deref(), Some("Home"));
    assert_eq!(home.source, DiscoverySource::Root);
    assert_eq!(report.page(&format!("{}/b", root)).unwrap().status, 200);
}

#[tokio::test]
async fn test_root_included_when_sitemap_omits_it() {
    let server = MockServer::start().await;
    let root = server.uri();

    Mock::given(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>{0}/x</loc></url>
  <url><loc>{0}/y</loc></url>
</urlset>"#,
                root
            ),
            "application/xml",
        ))
        .mount(&server)
        .await;

    mount_page(&server, "/", "<p>home</p>").await;
    mount_page(&server, "/x", "<p>x</p>").await;
    mount_page(&server, "/y", "<p>y</p>").await;

    let report = crawl(
        &root,
        CrawlOptions {
            follow_links: false,
            ..test_options()
        },
    )
    .await
    .unwrap();

    assert_eq!(report.pages.len(), 3);
    assert!(report.page(&format!("{}/", root)).is_some());
    assert_eq!(
        report.page(&format!("{}/x", root)).unwrap().source,
        DiscoverySource::Sitemap
    );

    let stats = &report.statistics;
    assert!(stats.sitemap_found);
    assert_eq!(stats.sitemap_url.as_deref(), Some(format!("{}/sitemap.xml", root).as_str()));
    assert_eq!(stats.sitemap_url_count, 2);
    assert_eq!(stats.total_discovered, 3);
}

#[tokio::test]
async fn test_failed_child_sitemaps_recorded() {
    let server = MockServer::start().await;
    let root = server.uri();

    let children: Vec<String> = (1..=5).map(|i| format!("{}/child-{}.xml", root, i)).collect();
    let entries: String = children
        .iter()
        .map(|loc| format!("  <sitemap><loc>{}</loc></sitemap>\n", loc))
        .collect();

    Mock::given(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<sitemapindex xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n{}</sitemapindex>",
                entries
            ),
            "application/xml",
        ))
        .mount(&server)
        .await;

    for i in 1..=5 {
        let response = if i == 2 || i == 4 {
            ResponseTemplate::new(500)
        } else {
            ResponseTemplate::new(200).set_body_raw(
                format!(
                    "<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\"><url><loc>{}/page-{}</loc></url></urlset>",
                    root, i
                ),
                "application/xml",
            )
        };
        Mock::given(method("GET"))
            .and(path(format!("/child-{}.xml", i)))
            .respond_with(response)
            .mount(&server)
            .await;
    }

    mount_page(&server, "/", "<p>home</p>").await;
    for i in [1, 3, 5] {
        mount_page(&server, &format!("/page-{}", i), "<p>listed</p>").await;
    }

    let report = crawl(
        &root,
        CrawlOptions {
            follow_links: false,
            ..test_options()
        },
    )
    .await
    .unwrap();

    let mut urls = report.urls();
    urls.sort();
    assert_eq!(
        urls,
        vec![
            format!("{}/", root),
            format!("{}/page-1", root),
            format!("{}/page-3", root),
            format!("{}/page-5", root),
        ]
    );

    let stats = &report.statistics;
    assert!(stats.sitemap_found);
    assert_eq!(stats.sitemap_url_count, 3);
    assert_eq!(stats.errors.len(), 2);
    assert!(stats.errors.iter().all(|e| e.stage == ErrorStage::Sitemap));

    let mut failed: Vec<_> = stats.errors.iter().map(|e| e.url.clone()).collect();
    failed.sort();
    assert_eq!(failed, vec![children[1].clone(), children[3].clone()]);
}

#[tokio::test]
async fn test_page_cap_with_link_storm() {
    let server = MockServer::start().await;

    let links: String = (0..500)
        .map(|i| format!(r#"<a href="/p{}">Page {}</a>"#, i, i))
        .collect();
    mount_page(&server, "/", &format!("<html><body>{}</body></html>", links)).await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/p\d+$"))
        .respond_with(html("<p>leaf</p>"))
        .mount(&server)
        .await;

    let root = server.uri();
    let report = crawl(
        &root,
        CrawlOptions {
            max_pages: 10,
            ..test_options()
        },
    )
    .await
    .unwrap();

    assert_eq!(report.pages.len(), 10);
    assert!(report.page(&format!("{}/", root)).is_some());
    assert_eq!(report.statistics.total_fetched, 10);
    assert!(report.statistics.queue_discarded > 0);

    let requests = server.received_requests().await.unwrap();
    let page_gets = requests
        .iter()
        .filter(|r| r.method.as_str() == "GET" && r.url.path().starts_with("/p"))
        .count();
    assert!(page_gets <= 9 + test_options().max_concurrent_fetches);
}

#[tokio::test]
async fn test_no_duplicate_fetch_across_sources() {
    let server = MockServer::start().await;
    let root = server.uri();

    Mock::given(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!(
                "<urlset><url><loc>{0}/shared</loc></url><url><loc>{0}/shared/</loc></url></urlset>",
                root
            ),
            "application/xml",
        ))
        .mount(&server)
        .await;

    mount_page(
        &server,
        "/",
        r#"<a href="/shared">S</a><a href="/shared/index.html">S</a><a href="/shared?utm=1">S</a>"#,
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/shared"))
        .respond_with(html(r#"<a href="/">Home</a><a href="/shared">Self</a>"#))
        .expect(1)
        .mount(&server)
        .await;

    let report = crawl(&root, test_options()).await.unwrap();

    assert_eq!(report.pages.len(), 2);
    assert!(report.statistics.duplicates_skipped >= 1);
}

#[tokio::test]
async fn test_redirects_collapse_onto_one_page() {
    let server = MockServer::start().await;
    let root = server.uri();

    mount_page(&server, "/", r#"<a href="/old">Old</a><a href="/new">New</a>"#).await;

    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new"))
        .mount(&server)
        .await;

    mount_page(&server, "/new", "<title>New</title>").await;

    let report = crawl(&root, test_options()).await.unwrap();

    let landed: Vec<_> = report
        .pages
        .iter()
        .filter(|page| page.url.path() == "/new")
        .collect();
    assert_eq!(landed.len(), 1);
    assert!(report.page(&format!("{}/old", root)).is_none());
    assert_eq!(report.pages.len(), 2);
    assert_eq!(report.statistics.duplicates_skipped, 1);
}

#[tokio::test]
async fn test_redirect_loop_recorded() {
    let server = MockServer::start().await;
    let root = server.uri();

    mount_page(&server, "/", r#"<a href="/loop-a">Loop</a>"#).await;

    Mock::given(method("GET"))
        .and(path("/loop-a"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop-b"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/loop-b"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/loop-a"))
        .mount(&server)
        .await;

    let report = crawl(&root, test_options()).await.unwrap();

    assert_eq!(report.pages.len(), 1);
    let errors = &report.statistics.errors;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].stage, ErrorStage::Redirect);
    assert_eq!(errors[0].url, format!("{}/loop-a", root));
}

#[tokio::test]
async fn test_robots_disallow_respected() {
    let server = MockServer::start().await;
    let root = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"))
        .mount(&server)
        .await;

    mount_page(&server, "/", r#"<a href="/private/report">P</a><a href="/public">Q</a>"#).await;
    mount_page(&server, "/public", "<p>public</p>").await;

    Mock::given(method("GET"))
        .and(path("/private/report"))
        .respond_with(html("<p>secret</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let report = crawl(&root, test_options()).await.unwrap();

    assert_eq!(report.pages.len(), 2);
    assert_eq!(report.statistics.robots_blocked, 1);
    assert!(report.page(&format!("{}/public", root)).is_some());
}

#[tokio::test]
async fn test_robots_ignored_when_disabled() {
    let server = MockServer::start().await;
    let root = server.uri();

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"))
        .mount(&server)
        .await;

    mount_page(&server, "/", r#"<a href="/anything">A</a>"#).await;
    mount_page(&server, "/anything", "<p>a</p>").await;

    let report = crawl(
        &root,
        CrawlOptions {
            respect_robots: false,
            ..test_options()
        },
    )
    .await
    .unwrap();

    assert_eq!(report.pages.len(), 2);
    assert_eq!(report.statistics.robots_blocked, 0);
}

#[tokio::test]
async fn test_failed_pages_absorbed() {
    let server = MockServer::start().await;
    let root = server.uri();

    mount_page(
        &server,
        "/",
        r#"<a href="/missing">M</a><a href="/data">D</a><a href="/broken">B</a><a href="/ok">OK</a>"#,
    )
    .await;
    mount_page(&server, "/ok", "<p>fine</p>").await;

    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("{}", "application/json"))
        .mount(&server)
        .await;

    // Retried once, then recorded
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let report = crawl(&root, test_options()).await.unwrap();

    assert_eq!(report.pages.len(), 2);
    let stats = &report.statistics;
    assert_eq!(stats.errors.len(), 3);
    assert!(stats.errors.iter().all(|e| e.stage == ErrorStage::Fetch));
    assert_eq!(stats.errors_by_stage().get(&ErrorStage::Fetch), Some(&3));
}

/// Fetcher that fails every request, standing in for a broken renderer
struct FailingFetcher;

#[async_trait]
impl PageFetcher for FailingFetcher {
    async fn fetch(&self, _url: &Url, _timeout: Duration) -> FetchResult {
        FetchResult::NetworkError {
            error: "browser crashed".to_string(),
        }
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

#[tokio::test]
async fn test_root_last_resort_fetch() {
    let server = MockServer::start().await;
    let root = server.uri();

    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(html("<title>Rescued</title>"))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = Coordinator::with_fetcher(&root, test_options(), Arc::new(FailingFetcher))
        .await
        .unwrap();
    let report = coordinator.run().await;

    assert_eq!(report.pages.len(), 1);
    assert_eq!(report.pages[0].title.as_deref(), Some("Rescued"));
    assert!(report.statistics.used_root_fallback);
    assert_eq!(report.statistics.strategy, "failing");
    assert_eq!(report.statistics.errors.len(), 1);
    assert_eq!(report.statistics.errors[0].message, "network error: browser crashed");
}

#[tokio::test]
async fn test_empty_site_reports_errors() {
    let server = MockServer::start().await;

    let report = crawl(&server.uri(), test_options()).await.unwrap();

    assert!(report.pages.is_empty());
    assert!(!report.statistics.used_root_fallback);
    // Queue attempt plus the last-resort attempt
    assert_eq!(report.statistics.errors.len(), 2);
}

#[tokio::test]
async fn test_private_root_rejected_by_default() {
    let server = MockServer::start().await;

    let result = crawl(&server.uri(), CrawlOptions::default()).await;
    assert!(result.is_err());
}
