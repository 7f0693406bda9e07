//! URL policy and GitHub raw rewriting

use crate::{FetchError, FetchResult};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

const RAW_HOST: &str = "https://raw.githubusercontent.com";

/// Parse a URL and accept it only if it is public `https`.
///
/// Rejects other schemes, missing hosts, `localhost`, `*.local` and
/// private, loopback, link-local, multicast or unspecified IP literals.
pub fn validate_public_https_url(raw: &str) -> FetchResult<Url> {
    let parsed = Url::parse(raw.trim()).map_err(|e| FetchError::InvalidUrl(format!("{}: {}", raw, e)))?;

    if parsed.scheme() != "https" {
        return Err(FetchError::Policy(format!("unsupported URL scheme: {}", raw)));
    }

    match parsed.host() {
        None => Err(FetchError::Policy(format!("URL must include a hostname: {}", raw))),
        Some(Host::Domain(domain)) => {
            let hostname = domain.trim().to_lowercase();
            if hostname.is_empty() {
                return Err(FetchError::Policy(format!("URL must include a hostname: {}", raw)));
            }
            if is_blocked_hostname(&hostname) {
                return Err(FetchError::Policy(format!("blocked URL host: {}", hostname)));
            }
            Ok(parsed)
        }
        Some(Host::Ipv4(ip)) => check_ip(IpAddr::V4(ip)).map(|_| parsed),
        Some(Host::Ipv6(ip)) => check_ip(IpAddr::V6(ip)).map(|_| parsed),
    }
}

fn check_ip(ip: IpAddr) -> FetchResult<()> {
    if is_blocked_ip(&ip) {
        return Err(FetchError::Policy(format!("blocked URL IP: {}", ip)));
    }
    Ok(())
}

fn is_blocked_hostname(hostname: &str) -> bool {
    hostname == "localhost" || hostname.ends_with(".local")
}

pub fn is_blocked_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_ipv4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(mapped) => is_blocked_ipv4(&mapped),
            None => is_blocked_ipv6(v6),
        },
    }
}

fn is_blocked_ipv4(ip: &Ipv4Addr) -> bool {
    ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_multicast()
        || ip.is_unspecified()
}

fn is_blocked_ipv6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    let unique_local = (first & 0xfe00) == 0xfc00;
    let link_local = (first & 0xffc0) == 0xfe80;
    ip.is_loopback() || ip.is_multicast() || ip.is_unspecified() || unique_local || link_local
}

/// Raw-content URL for a GitHub page, or `None` when the URL should be
/// fetched as is (non-GitHub, wiki, releases, org-only and other pages).
pub fn github_raw_url(input: &str) -> Option<String> {
    let parsed = Url::parse(input).ok()?;
    if parsed.host_str() != Some("github.com") {
        return None;
    }

    let segments: Vec<&str> = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .collect();
    if segments.len() < 2 {
        return None;
    }

    let (owner, repo) = (segments[0], segments[1]);
    match segments.get(2).copied() {
        Some("wiki") | Some("releases") => None,
        Some("blob") if segments.len() >= 4 => Some(format!(
            "{}/{}/{}/{}/{}",
            RAW_HOST,
            owner,
            repo,
            segments[3],
            segments[4..].join("/")
        )),
        Some("tree") if segments.len() > 4 => Some(format!(
            "{}/{}/{}/{}/{}/README.md",
            RAW_HOST,
            owner,
            repo,
            segments[3],
            segments[4..].join("/")
        )),
        Some("tree") if segments.len() == 4 => Some(format!(
            "{}/{}/{}/{}/README.md",
            RAW_HOST, owner, repo, segments[3]
        )),
        None => Some(format!("{}/{}/{}/HEAD/README.md", RAW_HOST, owner, repo)),
        _ => None,
    }
}
