//! Header rewriting for proxied requests: forwarding headers, hop-by-hop
//! stripping.
//!
//! Existing `X-Forwarded-*`/`Forwarded` headers from the client are never
//! trusted as-is; this module appends to them (for `X-Forwarded-For`) or
//! overwrites them (for `X-Forwarded-Proto`/`X-Forwarded-Host`) rather than
//! passing client-supplied values straight through.

use std::net::IpAddr;

use crate::http1::HeaderList;

/// Headers that are connection-scoped and must not be forwarded to the
/// next hop (RFC 7230 section 6.1, plus `Connection`'s own named tokens).
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Strip hop-by-hop headers, including any header named by a `Connection`
/// token (e.g. `Connection: X-Custom` means strip `X-Custom` too).
pub fn strip_hop_by_hop(headers: &mut HeaderList) {
    let mut extra: Vec<String> = Vec::new();
    if let Some(connection) = headers.get("connection") {
        extra.extend(connection.split(',').map(|s| s.trim().to_string()));
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    for name in extra {
        if !name.is_empty() {
            headers.remove(&name);
        }
    }
}

/// Append the client's address to `X-Forwarded-For`, set
/// `X-Forwarded-Proto`/`X-Forwarded-Host`, rewrite `Host` to the backend's
/// own host:port, and stamp `X-Request-Id` so logs on both sides of the
/// hop can be correlated.
pub fn apply_forwarding_headers(
    headers: &mut HeaderList,
    client_ip: IpAddr,
    is_tls: bool,
    original_host: &str,
    backend_host: &str,
    request_id: &str,
) {
    let forwarded_for = match headers.get("x-forwarded-for") {
        Some(existing) => format!("{existing}, {client_ip}"),
        None => client_ip.to_string(),
    };
    headers.remove("x-forwarded-for");
    headers.push("X-Forwarded-For", forwarded_for);

    headers.remove("x-real-ip");
    headers.push("X-Real-IP", client_ip.to_string());

    headers.remove("x-forwarded-proto");
    headers.push("X-Forwarded-Proto", if is_tls { "https" } else { "http" });

    headers.remove("x-forwarded-host");
    headers.push("X-Forwarded-Host", original_host.to_string());

    headers.remove("host");
    headers.push("Host", backend_host.to_string());

    headers.remove("x-request-id");
    headers.push("X-Request-Id", request_id.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_hop_by_hop_headers() {
        let mut headers = HeaderList::new();
        headers.push("Connection", "keep-alive");
        headers.push("Keep-Alive", "timeout=5");
        headers.push("Content-Type", "text/plain");
        strip_hop_by_hop(&mut headers);
        assert!(!headers.contains("connection"));
        assert!(!headers.contains("keep-alive"));
        assert!(headers.contains("content-type"));
    }

    #[test]
    fn strips_headers_named_in_connection_token() {
        let mut headers = HeaderList::new();
        headers.push("Connection", "X-Custom");
        headers.push("X-Custom", "value");
        strip_hop_by_hop(&mut headers);
        assert!(!headers.contains("x-custom"));
    }

    #[test]
    fn appends_to_existing_forwarded_for() {
        let mut headers = HeaderList::new();
        headers.push("X-Forwarded-For", "10.0.0.1");
        let client: IpAddr = "203.0.113.5".parse().unwrap();
        apply_forwarding_headers(&mut headers, client, false, "example.com", "backend:9000", "req-1");
        assert_eq!(headers.get("x-forwarded-for"), Some("10.0.0.1, 203.0.113.5"));
        assert_eq!(headers.get("x-real-ip"), Some("203.0.113.5"));
        assert_eq!(headers.get("host"), Some("backend:9000"));
        assert_eq!(headers.get("x-forwarded-proto"), Some("http"));
        assert_eq!(headers.get("x-request-id"), Some("req-1"));
    }
}
