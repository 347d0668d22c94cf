//! Sitemap XML parser
//!
//! Reads `<urlset>` and `<sitemapindex>` documents. Namespace prefixes are
//! ignored by matching on local names. When the strict `url/loc` or
//! `sitemap/loc` hierarchy yields nothing, a lenient scan accepts any `<loc>`
//! element anywhere in the text.

use quick_xml::events::Event;
use quick_xml::Reader;
use regex::Regex;
use std::sync::LazyLock;

/// Any `<loc>` element, with an optional namespace prefix and CDATA wrapper
static LENIENT_LOC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(?:[a-z0-9_.-]+:)?loc\b[^>]*>\s*(?:<!\[CDATA\[)?(.*?)(?:\]\]>)?\s*</(?:[a-z0-9_.-]+:)?loc\s*>")
        .expect("lenient loc pattern")
});

/// Opening tag of a sitemap index
static INDEX_ROOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(?:[a-z0-9_.-]+:)?sitemapindex\b").expect("sitemapindex pattern")
});

/// A parsed sitemap document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SitemapDocument {
    /// `<sitemapindex>`: locations of child sitemaps
    Index(Vec<String>),
    /// `<urlset>`: page locations
    UrlSet(Vec<String>),
}

impl SitemapDocument {
    pub fn locations(&self) -> &[String] {
        match self {
            SitemapDocument::Index(locations) | SitemapDocument::UrlSet(locations) => locations,
        }
    }

    pub fn is_index(&self) -> bool {
        matches!(self, SitemapDocument::Index(_))
    }
}

/// Parses a sitemap or sitemap index
///
/// Never fails: malformed input degrades to whatever `<loc>` values can be
/// recovered, possibly none.
///
/// # Example
///
/// ```
/// use site_harvest::sitemap::{parse_sitemap_document, SitemapDocument};
///
/// let xml = r#"<urlset><url><loc>https://example.com/a</loc></url></urlset>"#;
/// assert_eq!(
///     parse_sitemap_document(xml),
///     SitemapDocument::UrlSet(vec!["https://example.com/a".to_string()])
/// );
/// ```
pub fn parse_sitemap_document(xml: &str) -> SitemapDocument {
    let strict = parse_strict(xml);

    if !strict.children.is_empty() {
        return SitemapDocument::Index(strict.children);
    }
    if !strict.pages.is_empty() {
        return SitemapDocument::UrlSet(strict.pages);
    }

    let locations = lenient_locations(xml);
    let is_index = match strict.root.as_deref() {
        Some(root) => root == "sitemapindex",
        None => INDEX_ROOT.is_match(xml),
    };

    if !locations.is_empty() {
        tracing::debug!(
            "Strict sitemap parse found nothing, lenient scan recovered {} locations",
            locations.len()
        );
    }

    if is_index {
        SitemapDocument::Index(locations)
    } else {
        SitemapDocument::UrlSet(locations)
    }
}

#[derive(Debug, Default)]
struct StrictParse {
    root: Option<String>,
    children: Vec<String>,
    pages: Vec<String>,
}

/// Walks the document and collects `<loc>` values by their parent element
fn parse_strict(xml: &str) -> StrictParse {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut result = StrictParse::default();
    let mut stack: Vec<String> = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = local_name(e.local_name().as_ref());
                if result.root.is_none() {
                    result.root = Some(name.clone());
                }
                if name == "loc" {
                    text.clear();
                }
                stack.push(name);
            }
            Ok(Event::End(e)) => {
                let name = local_name(e.local_name().as_ref());
                if name == "loc" {
                    let parent = stack.len().checked_sub(2).and_then(|i| stack.get(i));
                    let value = text.trim();
                    if !value.is_empty() {
                        match parent.map(String::as_str) {
                            Some("sitemap") => result.children.push(value.to_string()),
                            Some("url") => result.pages.push(value.to_string()),
                            _ => {}
                        }
                    }
                    text.clear();
                }
                stack.pop();
            }
            Ok(Event::Text(t)) => {
                if stack.last().map(String::as_str) == Some("loc") {
                    match t.unescape() {
                        Ok(unescaped) => text.push_str(&unescaped),
                        Err(_) => text.push_str(&String::from_utf8_lossy(&t)),
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if stack.last().map(String::as_str) == Some("loc") {
                    text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::debug!(
                    "Sitemap XML error at position {}: {}",
                    reader.buffer_position(),
                    e
                );
                break;
            }
            _ => {}
        }
    }

    result
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_ascii_lowercase()
}

/// Collects every `<loc>` value in the raw text, in document order
fn lenient_locations(xml: &str) -> Vec<String> {
    LENIENT_LOC
        .captures_iter(xml)
        .filter_map(|captures| captures.get(1))
        .map(|m| {
            let raw = m.as_str().trim();
            quick_xml::escape::unescape(raw)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| raw.to_string())
        })
        .filter(|loc| !loc.is_empty())
        .collect()
}
