//! Client address extraction
//!
//! The candidate address comes from a trusted header set by the fronting proxy
//! (conventionally `X-Real-IP`) and falls back to the transport peer address.
//! Nothing here validates the result; an unparseable string is the lookup
//! stage's problem.

use axum::http::{HeaderMap, HeaderName};

/// Default name of the trusted forwarded-address header.
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Extract the candidate client address for a request
///
/// # Arguments
/// * `headers` - HTTP request headers
/// * `real_ip_header` - Name of the trusted header to prefer
/// * `peer_addr` - Transport-level peer address, usually `host:port`
///
/// # Returns
/// The trimmed trusted header value if present and non-empty, otherwise the peer
/// address with any port suffix removed
pub fn extract_client_ip(headers: &HeaderMap, real_ip_header: &HeaderName, peer_addr: &str) -> String {
    // A value with non-visible-ASCII bytes is still a present value
    let trusted = headers
        .get(real_ip_header)
        .map(|h| String::from_utf8_lossy(h.as_bytes()))
        .filter(|s| !s.trim().is_empty());

    match trusted {
        Some(ip) => ip.trim().to_string(),
        None => strip_port(peer_addr).to_string(),
    }
}

/// Remove a trailing `:port` from `host:port` or `[v6]:port`.
///
/// Strings that are not in host:port form (a bare IPv6 address, a bare host)
/// are returned unchanged.
pub fn strip_port(addr: &str) -> &str {
    let addr = addr.trim();

    if let Some(rest) = addr.strip_prefix('[') {
        // [host]:port or [host]
        return match rest.split_once(']') {
            Some((host, tail)) if tail.is_empty() || tail.starts_with(':') => host,
            _ => addr,
        };
    }

    match addr.split_once(':') {
        // More than one colon without brackets is an IPv6 literal, not host:port
        Some((host, port)) if !port.contains(':') => host,
        _ => addr,
    }
}
