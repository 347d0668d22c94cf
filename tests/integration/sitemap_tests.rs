//! Integration tests for sitemap discovery and resolution
//!
//! Each test runs against a wiremock server standing in for the site.

use site_harvest::crawler::RetryPolicy;
use site_harvest::sitemap::SitemapResolver;
use site_harvest::CrawlOptions;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn resolver() -> SitemapResolver {
    let options = CrawlOptions {
        allow_private_hosts: true,
        per_page_timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        },
        ..Default::default()
    };
    SitemapResolver::from_options(&options).unwrap()
}

fn xml(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "application/xml")
}

fn urlset(locs: &[String]) -> String {
    let entries: String = locs
        .iter()
        .map(|loc| format!("  <url><loc>{}</loc></url>\n", loc))
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n{}</urlset>",
        entries
    )
}

fn sitemap_index(locs: &[String]) -> String {
    let entries: String = locs
        .iter()
        .map(|loc| format!("  <sitemap><loc>{}</loc></sitemap>\n", loc))
        .collect();
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<sitemapindex xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n{}</sitemapindex>",
        entries
    )
}

fn root_of(server: &MockServer) -> Url {
    Url::parse(&format!("{}/", server.uri())).unwrap()
}

#[tokio::test]
async fn test_discover_conventional_location() {
    let server = MockServer::start().await;
    let root = root_of(&server);

    Mock::given(path("/sitemap_index.xml"))
        .respond_with(xml(urlset(&[format!("{}a", root)])))
        .mount(&server)
        .await;

    let found = resolver().discover(&root).await;
    assert_eq!(found, Some(root.join("/sitemap_index.xml").unwrap()));
}

#[tokio::test]
async fn test_earliest_conventional_location_wins() {
    let server = MockServer::start().await;
    let root = root_of(&server);

    for location in ["/wp-sitemap.xml", "/sitemap.xml", "/sitemaps.xml"] {
        Mock::given(path(location))
            .respond_with(xml(urlset(&[])))
            .mount(&server)
            .await;
    }

    let found = resolver().discover(&root).await;
    assert_eq!(found, Some(root.join("/sitemap.xml").unwrap()));
}

#[tokio::test]
async fn test_head_not_allowed_falls_back_to_get() {
    let server = MockServer::start().await;
    let root = root_of(&server);

    Mock::given(method("HEAD"))
        .and(path("/sitemap.xml"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(xml(urlset(&[])))
        .mount(&server)
        .await;

    let found = resolver().discover(&root).await;
    assert_eq!(found, Some(root.join("/sitemap.xml").unwrap()));
}

#[tokio::test]
async fn test_discover_via_robots_directive() {
    let server = MockServer::start().await;
    let root = root_of(&server);

    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            "User-agent: *\nAllow: /\n\nSitemap: {0}missing.xml\nSitemap: {0}custom/map.xml\n",
            root
        )))
        .mount(&server)
        .await;

    Mock::given(path("/custom/map.xml"))
        .respond_with(xml(urlset(&[format!("{}page", root)])))
        .mount(&server)
        .await;

    let discovery = resolver().discover_with_robots(&root).await;

    assert_eq!(discovery.sitemap, Some(root.join("/custom/map.xml").unwrap()));
    let robots = discovery.robots.unwrap();
    assert_eq!(robots.sitemaps().len(), 2);
}

#[tokio::test]
async fn test_no_sitemap_found() {
    let server = MockServer::start().await;

    let discovery = resolver().discover_with_robots(&root_of(&server)).await;

    assert!(discovery.sitemap.is_none());
    assert!(discovery.robots.is_none());
}

#[tokio::test]
async fn test_self_referential_index_terminates() {
    let server = MockServer::start().await;
    let root = root_of(&server);
    let index = format!("{}sitemap.xml", root);
    let child = format!("{}child.xml", root);

    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(xml(sitemap_index(&[index.clone(), child.clone()])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/child.xml"))
        .respond_with(xml(urlset(&[format!("{}one", root), format!("{}two", root)])))
        .expect(1)
        .mount(&server)
        .await;

    let resolution = resolver().resolve(&Url::parse(&index).unwrap()).await;

    assert_eq!(
        resolution.urls,
        vec![format!("{}one", root), format!("{}two", root)]
    );
    assert!(resolution.errors.is_empty());
    assert_eq!(resolution.sitemaps_fetched, 2);
}

#[tokio::test]
async fn test_partial_child_failure() {
    let server = MockServer::start().await;
    let root = root_of(&server);

    let children: Vec<String> = (1..=5).map(|i| format!("{}child-{}.xml", root, i)).collect();

    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(xml(sitemap_index(&children)))
        .mount(&server)
        .await;

    for i in 1..=5 {
        let response = if i == 2 || i == 4 {
            ResponseTemplate::new(500)
        } else {
            xml(urlset(&[format!("{}page-{}", root, i)]))
        };
        Mock::given(method("GET"))
            .and(path(format!("/child-{}.xml", i)))
            .respond_with(response)
            .mount(&server)
            .await;
    }

    let resolution = resolver()
        .resolve(&root.join("/sitemap.xml").unwrap())
        .await;

    let mut urls = resolution.urls.clone();
    urls.sort();
    assert_eq!(
        urls,
        vec![
            format!("{}page-1", root),
            format!("{}page-3", root),
            format!("{}page-5", root)
        ]
    );

    let mut failed: Vec<_> = resolution.errors.iter().map(|e| e.url.clone()).collect();
    failed.sort();
    assert_eq!(failed, vec![children[1].clone(), children[3].clone()]);
}

#[tokio::test]
async fn test_namespace_prefixed_sitemap() {
    let server = MockServer::start().await;
    let root = root_of(&server);

    let body = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ns:urlset xmlns:ns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <ns:url><ns:loc>{0}first</ns:loc></ns:url>
  <ns:url><ns:loc>{0}second</ns:loc></ns:url>
</ns:urlset>"#,
        root
    );

    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(xml(body))
        .mount(&server)
        .await;

    let urls = resolver().parse(&root.join("/sitemap.xml").unwrap()).await;
    assert_eq!(urls, vec![format!("{}first", root), format!("{}second", root)]);
}

#[tokio::test]
async fn test_malformed_sitemap_recovered() {
    let server = MockServer::start().await;
    let root = root_of(&server);

    // Unclosed elements and a stray ampersand break strict parsing
    let body = format!(
        "<urlset><url><loc>{0}kept</loc><url><loc>{0}also-kept</loc> & </urlset",
        root
    );

    Mock::given(method("GET"))
        .and(path("/sitemap.xml"))
        .respond_with(xml(body))
        .mount(&server)
        .await;

    let resolution = resolver().resolve(&root.join("/sitemap.xml").unwrap()).await;
    assert_eq!(
        resolution.urls,
        vec![format!("{}kept", root), format!("{}also-kept", root)]
    );
}
