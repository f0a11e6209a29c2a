//! Passive health checking: request outcomes observed on the proxy path
//! feed the same hysteresis counters active probing uses.
//!
//! Only connection errors, timeouts, and 5xx responses count as failures.
//! 4xx responses are a client error, not evidence the backend is unwell,
//! so they count as successes for health purposes.

use crate::config::schema::HealthCheckConfig;
use crate::load_balancer::backend::Backend;

/// Record the outcome of a proxied request against the backend's health
/// counters. `status` is `None` for connection errors and timeouts.
pub fn record_proxy_outcome(backend: &Backend, status: Option<u16>, config: &HealthCheckConfig) {
    let is_failure = match status {
        None => true,
        Some(code) => code >= 500,
    };
    if is_failure {
        backend.mark_failure(config.failure_threshold);
    } else {
        backend.mark_success(config.success_threshold);
    }
}
