//! SSRF guard
//!
//! Keeps the crawler away from loopback, link-local and private network
//! targets. Literal checks are synchronous; [`check_resolved`] additionally
//! resolves the host and rejects names that point at a loopback address.

use crate::UrlError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

/// Hostnames that always refer to the local machine or cloud metadata
const BLOCKED_NAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "ip6-localhost",
    "ip6-loopback",
    "metadata.google.internal",
];

/// Name suffixes reserved for local or internal networks
const BLOCKED_SUFFIXES: &[&str] = &[".localhost", ".local", ".internal"];

/// Returns true if the address lies in a loopback, private or link-local range
pub fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_ipv4(v4),
        IpAddr::V6(v6) => is_blocked_ipv6(v6),
    }
}

fn is_blocked_ipv4(ip: Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified()
}

fn is_blocked_ipv6(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_blocked_ipv4(mapped);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link-local
        || (first & 0xffc0) == 0xfe80
}

/// Checks a literal host (name or address) without touching the network
///
/// # Examples
///
/// ```
/// use site_harvest::url::guard::check_host_literal;
///
/// assert!(check_host_literal("example.com").is_ok());
/// assert!(check_host_literal("169.254.169.254").is_err());
/// assert!(check_host_literal("localhost").is_err());
/// ```
pub fn check_host_literal(host: &str) -> Result<(), UrlError> {
    let host = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase();

    if host.is_empty() {
        return Err(UrlError::MissingDomain);
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_blocked_ip(ip) {
            return Err(UrlError::BlockedHost(host));
        }
        return Ok(());
    }

    if BLOCKED_NAMES.contains(&host.as_str())
        || BLOCKED_SUFFIXES.iter().any(|suffix| host.ends_with(suffix))
    {
        return Err(UrlError::BlockedHost(host));
    }

    Ok(())
}

/// Checks the host of a parsed URL without touching the network
pub fn check_url_literal(url: &Url) -> Result<(), UrlError> {
    match url.host() {
        Some(Host::Ipv4(ip)) if is_blocked_ipv4(ip) => {
            Err(UrlError::BlockedHost(ip.to_string()))
        }
        Some(Host::Ipv6(ip)) if is_blocked_ipv6(ip) => {
            Err(UrlError::BlockedHost(ip.to_string()))
        }
        Some(Host::Domain(name)) => check_host_literal(name),
        Some(_) => Ok(()),
        None => Err(UrlError::MissingDomain),
    }
}

/// Literal check followed by DNS resolution
///
/// A name that resolves to a loopback or unspecified address is rejected.
/// Resolution failures are not treated as blocks; the request itself will
/// fail and be recorded by the caller.
pub async fn check_resolved(url: &Url) -> Result<(), UrlError> {
    check_url_literal(url)?;

    let Some(Host::Domain(name)) = url.host() else {
        return Ok(());
    };
    let port = url.port_or_known_default().unwrap_or(80);

    match tokio::net::lookup_host((name, port)).await {
        Ok(addrs) => {
            for addr in addrs {
                let ip = addr.ip();
                if ip.is_loopback() || ip.is_unspecified() {
                    tracing::warn!("Host {} resolves to local address {}", name, ip);
                    return Err(UrlError::BlockedHost(format!("{} -> {}", name, ip)));
                }
            }
            Ok(())
        }
        Err(e) => {
            tracing::debug!("DNS lookup for {} failed: {}", name, e);
            Ok(())
        }
    }
}
