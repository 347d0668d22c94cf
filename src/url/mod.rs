//! URL handling module for Site-Harvest
//!
//! This module provides URL canonicalization, the same-site crawl
//! eligibility predicate, host helpers and the SSRF guard.

mod domain;
pub mod guard;
mod normalize;

use crate::UrlError;
use std::fmt;
use url::Url;

// Re-export main functions
pub use domain::{bare_host, extract_domain, same_site};
pub use normalize::canonicalize;

/// Path extensions that never denote an HTML page
const NON_PAGE_EXTENSIONS: &[&str] = &[
    // archives
    "zip", "gz", "tgz", "tar", "rar", "7z", "bz2", "xz",
    // images
    "jpg", "jpeg", "png", "gif", "webp", "avif", "svg", "ico", "bmp", "tif", "tiff",
    // fonts
    "woff", "woff2", "ttf", "otf", "eot",
    // stylesheets and scripts
    "css", "js", "mjs", "map",
    // data files
    "json", "xml", "rss", "atom", "csv", "txt", "pdf", "doc", "docx", "xls", "xlsx", "ppt",
    "pptx",
    // media
    "mp3", "mp4", "m4a", "webm", "ogg", "wav", "avi", "mov", "mkv", "flac",
    // binaries
    "exe", "dmg", "apk", "msi", "bin", "iso",
];

/// How the site spells its own host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WwwPolicy {
    /// The site lives at the bare host (`example.com`)
    Strip,
    /// The site lives at the `www.` host (`www.example.com`)
    Prepend,
}

/// Site-wide canonicalization policy, decided once from the root URL
///
/// Holds the site's bare host, its `www.` spelling, the preferred scheme and
/// whether private network hosts may be crawled.
#[derive(Debug, Clone)]
pub struct SitePolicy {
    host: String,
    www: WwwPolicy,
    scheme: Option<String>,
    allow_private_hosts: bool,
}

impl SitePolicy {
    /// Derives the policy from a root URL
    ///
    /// A root without a scheme (`example.com`) is treated as `https://`.
    ///
    /// # Examples
    ///
    /// ```
    /// use site_harvest::url::{SitePolicy, WwwPolicy};
    ///
    /// let policy = SitePolicy::from_root("https://www.example.com/").unwrap();
    /// assert_eq!(policy.host(), "example.com");
    /// assert_eq!(policy.www(), WwwPolicy::Prepend);
    /// assert_eq!(policy.scheme(), Some("https"));
    /// ```
    pub fn from_root(root: &str) -> Result<Self, UrlError> {
        let url = Url::parse(&with_default_scheme(root)).map_err(|e| UrlError::Parse(e.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(UrlError::InvalidScheme(format!(
                "Only HTTP and HTTPS schemes are supported, got: {}",
                url.scheme()
            )));
        }

        let host = extract_domain(&url).ok_or(UrlError::MissingDomain)?;
        let www = if host.starts_with("www.") {
            WwwPolicy::Prepend
        } else {
            WwwPolicy::Strip
        };

        Ok(Self {
            host: bare_host(&host).to_string(),
            www,
            scheme: Some(url.scheme().to_string()),
            allow_private_hosts: false,
        })
    }

    /// Allows or forbids crawling hosts inside private network ranges
    pub fn with_private_hosts(mut self, allow: bool) -> Self {
        self.allow_private_hosts = allow;
        self
    }

    /// The site's host without any `www.` prefix
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn www(&self) -> WwwPolicy {
        self.www
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn allows_private_hosts(&self) -> bool {
        self.allow_private_hosts
    }

    /// The host spelling every same-site URL is rewritten to
    pub fn site_host(&self) -> String {
        match self.www {
            WwwPolicy::Strip => self.host.clone(),
            WwwPolicy::Prepend => format!("www.{}", self.host),
        }
    }
}

/// Prefixes `https://` to a root given without a scheme
pub fn with_default_scheme(root: &str) -> String {
    let root = root.trim();
    if root.contains("://") {
        root.to_string()
    } else {
        format!("https://{}", root)
    }
}

/// A canonical URL: the single representative of all equivalent references
/// to one resource on the site
///
/// Only [`canonicalize`] constructs these, so two values compare equal
/// exactly when they denote the same page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalUrl(pub(crate) Url);

impl CanonicalUrl {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    /// Lowercase host of the canonical URL
    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        self.0.path()
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for CanonicalUrl {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Decides whether a URL reference is a crawlable page of the site
///
/// Returns false when the URL cannot be canonicalized, points at a private or
/// loopback host (unless the policy allows private hosts), belongs to another
/// site once `www.` is ignored, or ends in a non-page file extension.
///
/// # Examples
///
/// ```
/// use site_harvest::url::{is_crawlable, SitePolicy};
///
/// let policy = SitePolicy::from_root("https://example.com").unwrap();
/// assert!(is_crawlable("https://www.example.com/about", None, &policy));
/// assert!(!is_crawlable("https://example.com/logo.png", None, &policy));
/// assert!(!is_crawlable("https://other.com/", None, &policy));
/// ```
pub fn is_crawlable(raw: &str, base: Option<&Url>, policy: &SitePolicy) -> bool {
    match canonicalize(raw, base, policy) {
        Some(canonical) => is_crawlable_canonical(&canonical, policy),
        None => false,
    }
}

/// Crawl eligibility for an already-canonical URL
pub fn is_crawlable_canonical(canonical: &CanonicalUrl, policy: &SitePolicy) -> bool {
    if !policy.allows_private_hosts() && guard::check_url_literal(canonical.as_url()).is_err() {
        return false;
    }

    if !same_site(canonical.host(), policy.host()) {
        return false;
    }

    !has_non_page_extension(canonical.path())
}

fn has_non_page_extension(path: &str) -> bool {
    let last_segment = path.rsplit('/').next().unwrap_or_default();
    match last_segment.rsplit_once('.') {
        Some((_, ext)) => {
            let ext = ext.to_ascii_lowercase();
            NON_PAGE_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> SitePolicy {
        SitePolicy::from_root("https://example.com").unwrap()
    }

    #[test]
    fn test_policy_from_bare_root() {
        let policy = SitePolicy::from_root("example.com").unwrap();
        assert_eq!(policy.host(), "example.com");
        assert_eq!(policy.www(), WwwPolicy::Strip);
        assert_eq!(policy.scheme(), Some("https"));
        assert_eq!(policy.site_host(), "example.com");
    }

    #[test]
    fn test_policy_rejects_bad_roots() {
        assert!(matches!(
            SitePolicy::from_root("ftp://example.com/"),
            Err(UrlError::InvalidScheme(_))
        ));
        assert!(SitePolicy::from_root("http://").is_err());
    }

    #[test]
    fn test_crawlable_same_site() {
        let policy = policy();
        assert!(is_crawlable("https://example.com/", None, &policy));
        assert!(is_crawlable("http://www.example.com/blog/post", None, &policy));
        assert!(is_crawlable("https://example.com/page.html", None, &policy));
        assert!(is_crawlable("https://example.com/v1.2/release", None, &policy));
    }

    #[test]
    fn test_not_crawlable_other_site() {
        let policy = policy();
        assert!(!is_crawlable("https://blog.example.com/x", None, &policy));
        assert!(!is_crawlable("https://example.org/", None, &policy));
        assert!(!is_crawlable("https://notexample.com/", None, &policy));
    }

    #[test]
    fn test_not_crawlable_assets() {
        let policy = policy();
        for path in [
            "/archive.zip",
            "/img/photo.JPG",
            "/fonts/a.woff2",
            "/style.css",
            "/app.js",
            "/feed.xml",
            "/report.pdf",
            "/video.mp4",
        ] {
            let url = format!("https://example.com{}", path);
            assert!(!is_crawlable(&url, None, &policy), "{} should be skipped", url);
        }
    }

    #[test]
    fn test_not_crawlable_unusable() {
        let policy = policy();
        assert!(!is_crawlable("mailto:a@example.com", None, &policy));
        assert!(!is_crawlable("not a url", None, &policy));
    }

    #[test]
    fn test_not_crawlable_private_targets() {
        let policy = policy();
        assert!(!is_crawlable("http://169.254.169.254/", None, &policy));
        assert!(!is_crawlable("http://localhost/admin", None, &policy));
        assert!(!is_crawlable("http://10.0.0.5/", None, &policy));

        // Even a site rooted at a private address stays blocked by default
        let internal = SitePolicy::from_root("http://10.0.0.5/").unwrap();
        assert!(!is_crawlable("http://10.0.0.5/", None, &internal));

        let allowed = internal.with_private_hosts(true);
        assert!(is_crawlable("http://10.0.0.5/", None, &allowed));
    }

    #[test]
    fn test_canonical_display() {
        let url = canonicalize("https://example.com/a/", None, &policy()).unwrap();
        assert_eq!(url.to_string(), "https://example.com/a");
        assert_eq!(url.host(), "example.com");
        assert_eq!(url.path(), "/a");
    }
}
