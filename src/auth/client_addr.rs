//! Source addresses used to key lockout counters.

use axum::http::HeaderMap;
use std::net::SocketAddr;

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Host part of `addr`, without any port.
///
/// Handles `1.2.3.4:80`, `[::1]:80`, bare `::1` and bare hosts.
#[must_use]
pub fn strip_port(addr: &str) -> &str {
    let addr = addr.trim();
    if let Some(rest) = addr.strip_prefix('[') {
        return rest.split_once(']').map_or(rest, |(host, _)| host);
    }
    match addr.rsplit_once(':') {
        // more than one colon and no brackets: a bare IPv6 address
        Some((host, _)) if host.contains(':') => addr,
        Some((host, _)) => host,
        None => addr,
    }
}

/// The peer address followed by every `X-Forwarded-For` hop, ports stripped.
#[must_use]
pub fn source_addresses(remote: Option<SocketAddr>, headers: &HeaderMap) -> Vec<String> {
    let mut addresses = Vec::new();
    if let Some(remote) = remote {
        addresses.push(remote.ip().to_string());
    }

    for value in headers.get_all(FORWARDED_FOR) {
        let Ok(value) = value.to_str() else {
            continue;
        };
        addresses.extend(
            value
                .split(',')
                .map(strip_port)
                .filter(|hop| !hop.is_empty())
                .map(str::to_string),
        );
    }

    addresses
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn strips_ports() {
        assert_eq!(strip_port("10.0.0.1:8080"), "10.0.0.1");
        assert_eq!(strip_port("10.0.0.1"), "10.0.0.1");
        assert_eq!(strip_port("[2001:db8::1]:443"), "2001:db8::1");
        assert_eq!(strip_port("2001:db8::1"), "2001:db8::1");
        assert_eq!(strip_port(" proxy.local:3128 "), "proxy.local");
    }

    #[test]
    fn peer_then_forwarded_hops() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_FOR,
            HeaderValue::from_static("203.0.113.9, 198.51.100.7:5000"),
        );
        let remote: Option<SocketAddr> = "127.0.0.1:41000".parse().ok();

        assert_eq!(
            source_addresses(remote, &headers),
            vec!["127.0.0.1", "203.0.113.9", "198.51.100.7"]
        );
    }

    #[test]
    fn ipv6_peer_has_no_brackets() {
        let remote: Option<SocketAddr> = "[::1]:41000".parse().ok();
        assert_eq!(source_addresses(remote, &HeaderMap::new()), vec!["::1"]);
    }

    #[test]
    fn no_peer_no_headers() {
        assert!(source_addresses(None, &HeaderMap::new()).is_empty());
    }

    #[test]
    fn repeated_headers_are_all_used() {
        let mut headers = HeaderMap::new();
        headers.append(FORWARDED_FOR, HeaderValue::from_static("10.1.1.1"));
        headers.append(FORWARDED_FOR, HeaderValue::from_static("10.2.2.2, "));
        assert_eq!(
            source_addresses(None, &headers),
            vec!["10.1.1.1", "10.2.2.2"]
        );
    }
}
