//! Circuit breaker for backend protection.
//!
//! # States
//! - Closed: normal operation, requests pass through
//! - Open: backend assumed down, requests fail fast
//! - Half-Open: a limited number of probe requests are allowed through
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive failures >= failure_threshold
//! Open → Half-Open: after timeout_secs has elapsed since opening
//! Half-Open → Closed: a probe request succeeds
//! Half-Open → Open: a probe request fails
//! ```
//!
//! One breaker per backend URL, not global, so one bad backend doesn't trip
//! requests to its siblings.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use dashmap::DashMap;

use crate::config::schema::CircuitBreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerEntry {
    state: Mutex<CircuitState>,
    failure_count: AtomicU32,
    opened_at: Mutex<Option<Instant>>,
    half_open_in_flight: AtomicU32,
}

impl Default for BreakerEntry {
    fn default() -> Self {
        Self {
            state: Mutex::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            opened_at: Mutex::new(None),
            half_open_in_flight: AtomicU32::new(0),
        }
    }
}

/// Registry of per-backend circuit breakers, keyed by backend URL.
#[derive(Debug, Default)]
pub struct CircuitBreakerRegistry {
    entries: DashMap<String, BreakerEntry>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a request to `backend_url` may proceed right now. Also
    /// performs the Open -> Half-Open transition and reserves a half-open
    /// probe slot when applicable, so callers only need to call this once
    /// before dispatching.
    pub fn allow(&self, backend_url: &str, config: &CircuitBreakerConfig) -> bool {
        if !config.enabled {
            return true;
        }
        let entry = self.entries.entry(backend_url.to_string()).or_default();
        let mut state = entry.state.lock().unwrap();
        match *state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = entry
                    .opened_at
                    .lock()
                    .unwrap()
                    .map(|t| t.elapsed().as_secs() >= config.timeout_secs)
                    .unwrap_or(true);
                if elapsed {
                    *state = CircuitState::HalfOpen;
                    entry.half_open_in_flight.store(1, Ordering::Relaxed);
                    tracing::info!(backend = backend_url, "circuit half-open, probing");
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                let in_flight = entry.half_open_in_flight.fetch_add(1, Ordering::Relaxed);
                if in_flight < config.half_open_requests {
                    true
                } else {
                    entry.half_open_in_flight.fetch_sub(1, Ordering::Relaxed);
                    false
                }
            }
        }
    }

    pub fn record_success(&self, backend_url: &str) {
        let entry = self.entries.entry(backend_url.to_string()).or_default();
        let mut state = entry.state.lock().unwrap();
        entry.failure_count.store(0, Ordering::Relaxed);
        if *state != CircuitState::Closed {
            *state = CircuitState::Closed;
            entry.half_open_in_flight.store(0, Ordering::Relaxed);
            *entry.opened_at.lock().unwrap() = None;
            tracing::info!(backend = backend_url, "circuit closed");
        }
    }

    pub fn record_failure(&self, backend_url: &str, config: &CircuitBreakerConfig) {
        if !config.enabled {
            return;
        }
        let entry = self.entries.entry(backend_url.to_string()).or_default();
        let mut state = entry.state.lock().unwrap();
        match *state {
            CircuitState::Closed => {
                let failures = entry.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= config.failure_threshold {
                    *state = CircuitState::Open;
                    *entry.opened_at.lock().unwrap() = Some(Instant::now());
                    tracing::warn!(backend = backend_url, "circuit open");
                }
            }
            CircuitState::HalfOpen => {
                *state = CircuitState::Open;
                *entry.opened_at.lock().unwrap() = Some(Instant::now());
                entry.half_open_in_flight.store(0, Ordering::Relaxed);
                tracing::warn!(backend = backend_url, "probe failed, circuit re-opened");
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self, backend_url: &str) -> CircuitState {
        self.entries
            .get(backend_url)
            .map(|e| *e.state.lock().unwrap())
            .unwrap_or(CircuitState::Closed)
    }

    pub fn reset(&self, backend_url: &str) {
        self.entries.remove(backend_url);
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            enabled: true,
            failure_threshold: 2,
            timeout_secs: 0,
            half_open_requests: 1,
        }
    }

    #[test]
    fn opens_after_threshold_failures() {
        let registry = CircuitBreakerRegistry::new();
        let cfg = config();
        registry.record_failure("b", &cfg);
        assert_eq!(registry.state("b"), CircuitState::Closed);
        registry.record_failure("b", &cfg);
        assert_eq!(registry.state("b"), CircuitState::Open);
        assert!(!registry.allow("b", &cfg));
    }

    #[test]
    fn half_open_probe_success_closes_circuit() {
        let registry = CircuitBreakerRegistry::new();
        let cfg = config();
        registry.record_failure("b", &cfg);
        registry.record_failure("b", &cfg);
        assert!(registry.allow("b", &cfg));
        assert_eq!(registry.state("b"), CircuitState::HalfOpen);
        registry.record_success("b");
        assert_eq!(registry.state("b"), CircuitState::Closed);
    }

    #[test]
    fn half_open_probe_failure_reopens() {
        let registry = CircuitBreakerRegistry::new();
        let cfg = config();
        registry.record_failure("b", &cfg);
        registry.record_failure("b", &cfg);
        assert!(registry.allow("b", &cfg));
        registry.record_failure("b", &cfg);
        assert_eq!(registry.state("b"), CircuitState::Open);
    }

    #[test]
    fn disabled_breaker_always_allows() {
        let registry = CircuitBreakerRegistry::new();
        let cfg = CircuitBreakerConfig { enabled: false, ..config() };
        registry.record_failure("b", &cfg);
        registry.record_failure("b", &cfg);
        registry.record_failure("b", &cfg);
        assert!(registry.allow("b", &cfg));
    }
}
