use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Errors produced while normalizing a user-supplied or discovered URL.
///
/// `Malformed` is the expected, common case (typos, free text). The other
/// variants are outbound host policy violations that guard against
/// server-side request forgery.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
    /// The URL string could not be parsed, even after adding a scheme.
    #[error("Invalid URL format")]
    Malformed,
    /// The URL uses a scheme other than http or https.
    #[error("URL not allowed: unsupported scheme {0} (only http/https)")]
    UnsupportedScheme(String),
    /// The URL points to a private/internal IP address.
    #[error("URL not allowed: private address {0}")]
    PrivateIp(String),
    /// The URL points to localhost.
    #[error("URL not allowed: localhost")]
    Localhost,
}

/// Which hosts outbound requests may target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostPolicy {
    /// Allow localhost, loopback and private network addresses.
    pub allow_private_hosts: bool,
}

impl HostPolicy {
    pub fn permissive() -> Self {
        Self {
            allow_private_hosts: true,
        }
    }
}

/// Normalizes a URL the way every engine entry point expects it.
///
/// A missing scheme is replaced by `https://`; the result must parse as an
/// absolute `http`/`https` URL with a host. Unless the policy allows it,
/// localhost and private/link-local IP literals are rejected.
///
/// ```
/// use feedhub::util::{normalize_feed_url, HostPolicy};
///
/// let url = normalize_feed_url("example.com/feed", HostPolicy::default()).unwrap();
/// assert_eq!(url.as_str(), "https://example.com/feed");
///
/// assert!(normalize_feed_url("http://192.168.1.1/feed", HostPolicy::default()).is_err());
/// ```
pub fn normalize_feed_url(input: &str, policy: HostPolicy) -> Result<Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Malformed);
    }

    let candidate = if has_scheme(trimmed) {
        trimmed.to_owned()
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&candidate).map_err(|_| UrlError::Malformed)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_owned())),
    }

    let Some(host) = url.host_str() else {
        return Err(UrlError::Malformed);
    };

    if !policy.allow_private_hosts {
        check_public_host(host)?;
    }

    Ok(url)
}

/// True when the input already carries an explicit `scheme://` prefix.
fn has_scheme(input: &str) -> bool {
    match input.find("://") {
        Some(pos) => {
            let scheme = &input[..pos];
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        }
        None => false,
    }
}

fn check_public_host(host: &str) -> Result<(), UrlError> {
    if host.eq_ignore_ascii_case("localhost") {
        return Err(UrlError::Localhost);
    }

    // Strip brackets from IPv6 addresses for parsing
    let host_for_parse = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    if let Ok(ip) = host_for_parse.parse::<IpAddr>() {
        if ip.is_loopback() {
            return Err(UrlError::Localhost);
        }
        if is_private_ip(&ip) {
            return Err(UrlError::PrivateIp(ip.to_string()));
        }
    }

    Ok(())
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => {
            ipv4.is_private() || ipv4.is_loopback() || ipv4.is_link_local() || ipv4.is_unspecified()
        }
        IpAddr::V6(ipv6) => {
            if ipv6.is_loopback() || ipv6.is_unspecified() {
                return true;
            }
            let segments = ipv6.segments();
            // Unique Local (fc00::/7)
            let is_unique_local = (segments[0] & 0xfe00) == 0xfc00;
            // Link-Local (fe80::/10)
            let is_link_local = (segments[0] & 0xffc0) == 0xfe80;
            is_unique_local || is_link_local
        }
    }
}
