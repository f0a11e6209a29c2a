//! Backend abstraction: a single HTTP backend URL plus its health and
//! connection-count state shared across requests and reloads.

use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

/// A single backend server, identified by its configured URL.
///
/// One `Backend` is created per distinct backend URL and kept alive across
/// config reloads so health and connection-count state survive a reload
/// instead of resetting to "healthy, zero connections" every time.
#[derive(Debug)]
pub struct Backend {
    pub url: String,
    pub host: String,
    pub port: u16,
    pub weight: u32,
    healthy: AtomicBool,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    active_connections: AtomicUsize,
}

impl Backend {
    /// Parse an `http://host:port` or `https://host:port` backend URL.
    /// Returns `None` if the URL has no host (validation should have
    /// already rejected such a config, but callers treat this gracefully).
    pub fn new(url: &str, weight: u32) -> Option<Self> {
        let parsed = url::Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_string();
        let port = parsed.port_or_known_default()?;
        Some(Self {
            url: url.to_string(),
            host,
            port,
            weight,
            healthy: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            active_connections: AtomicUsize::new(0),
        })
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    /// Record a successful probe or proxied request. Flips unhealthy ->
    /// healthy after `success_threshold` consecutive successes.
    pub fn mark_success(&self, success_threshold: u32) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if !self.is_healthy() && successes >= success_threshold {
            self.healthy.store(true, Ordering::Relaxed);
            tracing::info!(backend = %self.url, "backend marked healthy");
        }
    }

    /// Record a failed probe or proxied request. Flips healthy ->
    /// unhealthy after `failure_threshold` consecutive failures.
    pub fn mark_failure(&self, failure_threshold: u32) {
        self.consecutive_successes.store(0, Ordering::Relaxed);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if self.is_healthy() && failures >= failure_threshold {
            self.healthy.store(false, Ordering::Relaxed);
            tracing::warn!(backend = %self.url, "backend marked unhealthy");
        }
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// `host:port`, as forwarded in the rewritten `Host` header.
    pub fn host_port(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn inc_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    fn dec_connections(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    /// Increment the connection counter and return a guard that decrements
    /// it on drop, regardless of whether the request succeeds.
    pub fn connection_guard(self: &Arc<Self>) -> BackendConnectionGuard {
        self.inc_connections();
        BackendConnectionGuard {
            backend: self.clone(),
        }
    }
}

/// RAII guard recording an in-flight connection against a backend.
#[derive(Debug)]
pub struct BackendConnectionGuard {
    backend: Arc<Backend>,
}

impl Deref for BackendConnectionGuard {
    type Target = Backend;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for BackendConnectionGuard {
    fn drop(&mut self) {
        self.backend.dec_connections();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port() {
        let b = Backend::new("http://example.com:9000", 1).unwrap();
        assert_eq!(b.host, "example.com");
        assert_eq!(b.port, 9000);
    }

    #[test]
    fn defaults_port_from_scheme() {
        let b = Backend::new("https://example.com", 1).unwrap();
        assert_eq!(b.port, 443);
    }

    #[test]
    fn hysteresis_requires_consecutive_failures() {
        let b = Backend::new("http://example.com", 1).unwrap();
        b.mark_failure(3);
        b.mark_failure(3);
        assert!(b.is_healthy());
        b.mark_failure(3);
        assert!(!b.is_healthy());
    }

    #[test]
    fn hysteresis_requires_consecutive_successes_to_recover() {
        let b = Backend::new("http://example.com", 1).unwrap();
        b.mark_failure(1);
        assert!(!b.is_healthy());
        b.mark_success(2);
        assert!(!b.is_healthy());
        b.mark_success(2);
        assert!(b.is_healthy());
    }

    #[test]
    fn connection_guard_tracks_count() {
        let b = Arc::new(Backend::new("http://example.com", 1).unwrap());
        {
            let _g1 = b.connection_guard();
            let _g2 = b.connection_guard();
            assert_eq!(b.active_connections(), 2);
        }
        assert_eq!(b.active_connections(), 0);
    }
}
