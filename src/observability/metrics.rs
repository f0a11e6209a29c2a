//! Metrics collection and exposition.
//!
//! A `PrometheusHandle` is installed once at startup and kept in
//! [`crate::http::server::AppState`]; `dispatch` renders it on demand for
//! both the plain `GET /metrics` path and `/admin/metrics`, rather than
//! running a second HTTP listener.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_BUCKETS: &[f64] = &[10.0, 50.0, 100.0, 500.0, 1000.0, 5000.0, 10000.0];

/// Install the global recorder and register histogram buckets. Call once
/// at startup; the returned handle renders Prometheus text exposition.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full("request_duration_ms".to_string()), DURATION_BUCKETS)
        .expect("invalid bucket matcher")
        .set_buckets_for_metric(Matcher::Full("connection_duration_ms".to_string()), DURATION_BUCKETS)
        .expect("invalid bucket matcher")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

pub fn record_request(method: &str, status: u16, duration_ms: f64) {
    counter!("requests_total").increment(1);
    counter!("requests_by_status", "status" => status.to_string(), "method" => method.to_string()).increment(1);
    histogram!("request_duration_ms").record(duration_ms);
}

pub fn record_bytes(received: u64, sent: u64) {
    counter!("bytes_received_total").increment(received);
    counter!("bytes_sent_total").increment(sent);
}

pub fn record_backend_request(backend: &str, success: bool) {
    counter!("backend_requests_total", "backend" => backend.to_string()).increment(1);
    if !success {
        counter!("backend_errors_total", "backend" => backend.to_string()).increment(1);
    }
}

pub fn record_rate_limit_rejection() {
    counter!("rate_limit_rejections").increment(1);
}

pub fn record_circuit_state_change(backend: &str, state: &str) {
    counter!("circuit_breaker_state_changes", "backend" => backend.to_string(), "state" => state.to_string())
        .increment(1);
}

pub fn set_active_connections(n: i64) {
    gauge!("active_connections").set(n as f64);
}

pub fn set_uptime_seconds(secs: f64) {
    gauge!("uptime_seconds").set(secs);
}

pub fn record_connection_duration_ms(ms: f64) {
    histogram!("connection_duration_ms").record(ms);
}
