use crate::url::domain::{bare_host, extract_domain};
use crate::url::{CanonicalUrl, SitePolicy};
use crate::UrlError;
use url::Url;

/// Schemes that never denote a crawlable page
const REJECTED_SCHEMES: &[&str] = &["mailto:", "tel:", "javascript:", "data:", "ftp:", "file:"];

/// Directory index filenames that are equivalent to the directory itself
const INDEX_DOCUMENTS: &[&str] = &[
    "index.html",
    "index.htm",
    "index.shtml",
    "index.php",
    "index.asp",
    "index.aspx",
    "index.jsp",
    "default.html",
    "default.htm",
    "default.php",
    "default.asp",
    "default.aspx",
];

/// Canonicalizes a URL reference into the site's single identity string
///
/// # Canonicalization Steps
///
/// 1. Reject non-page schemes (`mailto:`, `tel:`, `javascript:`, `data:`, `ftp:`, `file:`)
/// 2. Strip the fragment
/// 3. Resolve relative, protocol-relative and root-relative forms against `base`
///    - If parsing fails, percent-decode once and retry
/// 4. Force the site's preferred scheme and drop default ports
/// 5. Lowercase the host; apply the site's `www.` policy to hosts of the same site
/// 6. Normalize the path:
///    - Collapse repeated slashes and dot segments
///    - Collapse trailing index documents (`/index.html`, `/default.php`, ...)
///    - Remove trailing slash (except for root /)
/// 7. Drop credentials, query string and fragment
///
/// Any failure yields `None`; callers treat it as "unusable URL".
///
/// # Examples
///
/// ```
/// use site_harvest::url::{canonicalize, SitePolicy};
///
/// let policy = SitePolicy::from_root("https://example.com").unwrap();
/// let url = canonicalize("http://WWW.EXAMPLE.COM/a/index.html?x=1#top", None, &policy).unwrap();
/// assert_eq!(url.as_str(), "https://example.com/a");
/// ```
pub fn canonicalize(raw: &str, base: Option<&Url>, policy: &SitePolicy) -> Option<CanonicalUrl> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || has_rejected_scheme(trimmed) {
        return None;
    }

    let without_fragment = match trimmed.split_once('#') {
        Some((before, _)) => before,
        None => trimmed,
    };
    if without_fragment.is_empty() {
        return None;
    }

    let mut url = match parse_candidate(without_fragment, base) {
        Ok(url) => url,
        Err(first) => {
            let decoded = urlencoding::decode(without_fragment).ok()?;
            if decoded == without_fragment {
                tracing::trace!("Unparsable URL {}: {}", raw, first);
                return None;
            }
            parse_candidate(&decoded, base).ok()?
        }
    };

    match normalize_parsed(&mut url, policy) {
        Ok(()) => Some(CanonicalUrl(url)),
        Err(e) => {
            tracing::trace!("Rejected URL {}: {}", raw, e);
            None
        }
    }
}

fn has_rejected_scheme(candidate: &str) -> bool {
    let lower = candidate
        .get(..12)
        .unwrap_or(candidate)
        .to_ascii_lowercase();
    REJECTED_SCHEMES.iter().any(|scheme| lower.starts_with(scheme))
}

fn parse_candidate(candidate: &str, base: Option<&Url>) -> Result<Url, UrlError> {
    let parsed = match base {
        Some(base) => base.join(candidate),
        None => Url::parse(candidate),
    };
    parsed.map_err(|e| UrlError::Parse(e.to_string()))
}

/// Applies the normalization rules to an already-parsed absolute URL
fn normalize_parsed(url: &mut Url, policy: &SitePolicy) -> Result<(), UrlError> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = extract_domain(url).ok_or(UrlError::MissingDomain)?;
    let host = if bare_host(&host) == policy.host() {
        policy.site_host()
    } else {
        host
    };
    if url.host_str() != Some(host.as_str()) {
        url.set_host(Some(&host))
            .map_err(|e| UrlError::Malformed(format!("Failed to set host: {}", e)))?;
    }

    if let Some(scheme) = policy.scheme() {
        if url.scheme() != scheme {
            url.set_scheme(scheme)
                .map_err(|_| UrlError::Malformed(format!("Cannot switch scheme to {}", scheme)))?;
        }
    }

    if url.port().is_some() && url.port() == default_port(url.scheme()) {
        let _ = url.set_port(None);
    }

    if !url.username().is_empty() || url.password().is_some() {
        let _ = url.set_username("");
        let _ = url.set_password(None);
    }

    let normalized_path = normalize_path(url.path());
    url.set_path(&normalized_path);
    url.set_query(None);
    url.set_fragment(None);

    Ok(())
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

/// Normalizes a URL path: collapses empty and dot segments, trailing index
/// documents and the trailing slash
fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    while segments.last().map_or(false, |last| is_index_document(last)) {
        segments.pop();
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    format!("/{}", segments.join("/"))
}

fn is_index_document(segment: &str) -> bool {
    INDEX_DOCUMENTS
        .iter()
        .any(|doc| segment.eq_ignore_ascii_case(doc))
}
