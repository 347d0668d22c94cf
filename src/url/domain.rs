use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use site_harvest::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str()
        .map(|h| h.trim_end_matches('.').to_lowercase())
}

/// Returns the host with a single leading `www.` label removed
///
/// Only the literal `www.` label is stripped; `www2.` and other
/// subdomains are different sites and stay untouched.
///
/// ```
/// use site_harvest::url::bare_host;
///
/// assert_eq!(bare_host("www.example.com"), "example.com");
/// assert_eq!(bare_host("blog.example.com"), "blog.example.com");
/// ```
pub fn bare_host(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// True when two hosts denote the same site once `www.` is ignored
pub fn same_site(a: &str, b: &str) -> bool {
    bare_host(a).eq_ignore_ascii_case(bare_host(b))
}
