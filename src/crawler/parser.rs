//! HTML parser for extracting links and metadata
//!
//! This module handles parsing fetched documents to extract:
//! - Same-site links to follow (anchors, forms, link relations, meta refresh)
//! - Client-side routes found in inline script text
//! - Page title

use crate::url::{canonicalize, is_crawlable_canonical, CanonicalUrl, SitePolicy};
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use url::Url;

/// `<link rel>` values that point at another page of the site
const FOLLOWED_LINK_RELS: &[&str] = &["canonical", "alternate", "next", "prev"];

/// Router `push`/`replace` calls: `router.push('/about')`, `history.replace("/x")`
static ROUTER_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:router|history|\$router|navigation)\.(?:push|replace)\(\s*['"`]([^'"`\s]+)['"`]"#)
        .expect("router call pattern")
});

/// `navigate('/path')` as used by React Router and similar
static NAVIGATE_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bnavigate\(\s*['"`]([^'"`\s]+)['"`]"#).expect("navigate pattern")
});

/// `location.href = '/path'`, `window.location = "/path"`, `location.assign('/x')`
static LOCATION_ASSIGN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\blocation(?:\.href)?\s*=\s*['"`]([^'"`\s]+)['"`]|\blocation\.(?:assign|replace)\(\s*['"`]([^'"`\s]+)['"`]"#,
    )
    .expect("location pattern")
});

/// `history.pushState(state, title, '/path')`
static PUSH_STATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:pushState|replaceState)\([^,()]*,[^,()]*,\s*['"`]([^'"`\s]+)['"`]"#)
        .expect("pushState pattern")
});

/// Route tables in JSON or object literals: `{"path": "/pricing"}`, `to: '/docs'`
static ROUTE_TABLE_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"["']?\b(?:path|route|url|href|to)["']?\s*:\s*['"](/[^'"\s]*)['"]"#)
        .expect("route table pattern")
});

/// Options for link extraction
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Scan inline script text for client-side routes
    pub script_sweep: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self { script_sweep: true }
    }
}

/// Extracted information from an HTML page
#[derive(Debug, Clone)]
pub struct ParsedPage {
    /// The page title (from <title> tag)
    pub title: Option<String>,

    /// Same-site canonical links in first-seen order
    pub links: Vec<CanonicalUrl>,
}

/// Parses HTML content and extracts links and metadata
///
/// # Link Sources
///
/// - `<a href>` (except `download` links) and `<area href>`
/// - `<form action>`
/// - `<link rel="canonical|alternate|next|prev" href>`
/// - `<meta http-equiv="refresh" content="0; url=...">`
/// - Inline script text: router push/replace, `navigate()`, `location`
///   assignment, `pushState`, route table entries (when `script_sweep` is on)
///
/// Relative links resolve against `<base href>` when the document has one.
/// Every candidate is canonicalized and must be crawlable for `policy`;
/// anything else is dropped silently.
///
/// # Arguments
///
/// * `html` - The HTML content to parse
/// * `page_url` - The (final) URL the document was served from
/// * `policy` - The site's canonicalization policy
/// * `options` - Extraction options
///
/// # Example
///
/// ```
/// use site_harvest::crawler::{parse_html, ExtractOptions};
/// use site_harvest::url::SitePolicy;
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><a href="/page/">Link</a></body></html>"#;
/// let page_url = Url::parse("https://example.com/").unwrap();
/// let policy = SitePolicy::from_root("https://example.com").unwrap();
/// let parsed = parse_html(html, &page_url, &policy, ExtractOptions::default());
/// assert_eq!(parsed.title, Some("Test".to_string()));
/// assert_eq!(parsed.links[0].as_str(), "https://example.com/page");
/// ```
pub fn parse_html(html: &str, page_url: &Url, policy: &SitePolicy, options: ExtractOptions) -> ParsedPage {
    let document = Html::parse_document(html);

    ParsedPage {
        title: title_of(&document),
        links: links_of(&document, page_url, policy, options),
    }
}

/// Extracts same-site links from a document
pub fn extract_links(
    html: &str,
    page_url: &Url,
    policy: &SitePolicy,
    options: ExtractOptions,
) -> Vec<CanonicalUrl> {
    let document = Html::parse_document(html);
    links_of(&document, page_url, policy, options)
}

/// Extracts the trimmed page title, if any
pub fn extract_title(html: &str) -> Option<String> {
    title_of(&Html::parse_document(html))
}

fn title_of(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;

    document
        .select(&title_selector)
        .next()
        .map(|element| {
            element
                .text()
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|s| !s.is_empty())
}

fn links_of(document: &Html, page_url: &Url, policy: &SitePolicy, options: ExtractOptions) -> Vec<CanonicalUrl> {
    let base = document_base(document, page_url);
    let mut collector = LinkCollector::new(&base, policy);

    for (selector, attr) in [("a[href]", "href"), ("area[href]", "href"), ("form[action]", "action")] {
        let Ok(selector) = Selector::parse(selector) else {
            continue;
        };
        for element in document.select(&selector) {
            if element.value().attr("download").is_some() {
                continue;
            }
            if let Some(value) = element.value().attr(attr) {
                collector.offer(value);
            }
        }
    }

    if let Ok(selector) = Selector::parse("link[rel][href]") {
        for element in document.select(&selector) {
            let rel = element.value().attr("rel").unwrap_or_default();
            let followed = rel
                .split_whitespace()
                .any(|r| FOLLOWED_LINK_RELS.iter().any(|f| r.eq_ignore_ascii_case(f)));
            if followed {
                if let Some(href) = element.value().attr("href") {
                    collector.offer(href);
                }
            }
        }
    }

    if let Ok(selector) = Selector::parse("meta[http-equiv][content]") {
        for element in document.select(&selector) {
            let is_refresh = element
                .value()
                .attr("http-equiv")
                .map_or(false, |v| v.eq_ignore_ascii_case("refresh"));
            if !is_refresh {
                continue;
            }
            if let Some(target) = element.value().attr("content").and_then(refresh_target) {
                collector.offer(target);
            }
        }
    }

    if options.script_sweep {
        if let Ok(selector) = Selector::parse("script:not([src])") {
            for element in document.select(&selector) {
                let script = element.text().collect::<String>();
                for route in script_routes(&script) {
                    collector.offer(route);
                }
            }
        }
    }

    collector.into_links()
}

/// Resolves `<base href>` against the page URL
fn document_base(document: &Html, page_url: &Url) -> Url {
    Selector::parse("base[href]")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .and_then(|element| element.value().attr("href"))
                .and_then(|href| page_url.join(href.trim()).ok())
        })
        .filter(|base| base.scheme() == "http" || base.scheme() == "https")
        .unwrap_or_else(|| page_url.clone())
}

/// Pulls the URL out of a meta refresh `content` value (`5; url=/next`)
fn refresh_target(content: &str) -> Option<&str> {
    let (_, rest) = content.split_once(';')?;
    let rest = rest.trim();
    let (key, value) = rest.split_once('=')?;
    if !key.trim().eq_ignore_ascii_case("url") {
        return None;
    }
    let value = value.trim().trim_matches(|c| c == '\'' || c == '"').trim();
    (!value.is_empty()).then_some(value)
}

/// Best-effort route candidates from inline script text
fn script_routes(script: &str) -> Vec<&str> {
    let mut routes = Vec::new();

    for pattern in [&*ROUTER_CALL, &*NAVIGATE_CALL, &*LOCATION_ASSIGN, &*PUSH_STATE, &*ROUTE_TABLE_ENTRY] {
        for captures in pattern.captures_iter(script) {
            let Some(route) = captures.iter().skip(1).flatten().next() else {
                continue;
            };
            let route = route.as_str();
            if is_plausible_route(route) {
                routes.push(route);
            }
        }
    }

    routes
}

/// Route patterns and template strings are not real pages
fn is_plausible_route(route: &str) -> bool {
    let looks_like_location =
        route.starts_with('/') || route.starts_with("http://") || route.starts_with("https://");
    looks_like_location
        && !route.starts_with("//")
        && !route.contains("${")
        && !route.contains('*')
        && !route.split('/').any(|segment| segment.starts_with(':'))
}

/// Canonicalizes, filters and deduplicates candidates in first-seen order
struct LinkCollector<'a> {
    base: &'a Url,
    policy: &'a SitePolicy,
    seen: HashSet<CanonicalUrl>,
    links: Vec<CanonicalUrl>,
}

impl<'a> LinkCollector<'a> {
    fn new(base: &'a Url, policy: &'a SitePolicy) -> Self {
        Self {
            base,
            policy,
            seen: HashSet::new(),
            links: Vec::new(),
        }
    }

    fn offer(&mut self, raw: &str) {
        let Some(canonical) = canonicalize(raw, Some(self.base), self.policy) else {
            return;
        };
        if !is_crawlable_canonical(&canonical, self.policy) {
            return;
        }
        if self.seen.insert(canonical.clone()) {
            self.links.push(canonical);
        }
    }

    fn into_links(self) -> Vec<CanonicalUrl> {
        self.links
    }
}
