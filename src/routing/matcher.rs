//! Route matching primitives: host normalization and path prefix matching.
//!
//! Host matching is case-insensitive and ignores a trailing port; path
//! matching is case-sensitive textual prefix matching (not segment-aware,
//! per spec) so `/api` matches `/api/v1` and `/apix` alike.

/// Normalize a `Host` header value for lookup: lowercase, port stripped.
pub fn normalize_host(host: &str) -> String {
    let without_port = host.split(':').next().unwrap_or(host);
    without_port.to_ascii_lowercase()
}

/// Find the longest configured prefix (by string length) that `path`
/// starts with. `prefixes` need not be sorted.
pub fn longest_prefix_match<'a>(path: &str, prefixes: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    prefixes
        .filter(|prefix| path.starts_with(prefix))
        .max_by_key(|prefix| prefix.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_case_and_strips_port() {
        assert_eq!(normalize_host("Example.COM:8080"), "example.com");
        assert_eq!(normalize_host("example.com"), "example.com");
    }

    #[test]
    fn picks_longest_matching_prefix() {
        let prefixes = vec!["/", "/api", "/api/v1"];
        assert_eq!(longest_prefix_match("/api/v1/users", prefixes.into_iter()), Some("/api/v1"));
    }

    #[test]
    fn falls_back_to_root_prefix() {
        let prefixes = vec!["/", "/api"];
        assert_eq!(longest_prefix_match("/other", prefixes.into_iter()), Some("/"));
    }

    #[test]
    fn no_match_returns_none() {
        let prefixes = vec!["/api"];
        assert_eq!(longest_prefix_match("/other", prefixes.into_iter()), None);
    }
}
