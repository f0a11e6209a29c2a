//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from the JSON config
//! file; every block has a default so a minimal file (or none at all) still
//! produces a usable configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the reverse proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS, connection cap).
    pub listener: ListenerConfig,

    /// Path-prefix routes, in the order they were declared.
    pub path_routes: Vec<PathRoute>,

    /// Host -> backend list routes. Keys are compared case-insensitively
    /// with the port stripped.
    pub domain_routes: HashMap<String, Vec<String>>,

    /// Load-balancing strategy applied across all routes.
    pub load_balancer_strategy: LoadBalancerStrategy,

    /// Per-backend weight, used by the weighted-round-robin strategy.
    /// Backends absent from this map default to weight 1.
    pub backend_weights: HashMap<String, u32>,

    pub rate_limiter: RateLimiterConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub health_check: HealthCheckConfig,
    pub cors: CorsConfig,
    pub admin: AdminConfig,
    pub timeouts: TimeoutConfig,
    pub limits: LimitsConfig,
    pub auto_https: AutoHttpsConfig,
    pub observability: ObservabilityConfig,
}

/// A path-prefix route: requests whose path starts with `prefix` are sent
/// to one of `backends` (via the load balancer if there is more than one).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PathRoute {
    pub prefix: String,
    pub backends: Vec<String>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
            max_connections: 10_000,
        }
    }
}

/// TLS configuration for the listener. ALPN advertises `h2, http/1.1` but
/// every connection is dispatched as HTTP/1.1 regardless of what ALPN
/// negotiates (see DESIGN.md, "HTTP/2 is not implemented").
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
}

/// Load-balancing strategies (process-global; see DESIGN.md Open Questions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LoadBalancerStrategy {
    #[default]
    RoundRobin,
    WeightedRoundRobin,
    LeastConnections,
    IpHash,
}

/// Rate limiting algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RateLimiterStrategy {
    #[default]
    TokenBucket,
    SlidingWindow,
    FixedWindow,
}

/// Per-(client-ip, path) rate limiting.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RateLimiterConfig {
    pub enabled: bool,
    pub strategy: RateLimiterStrategy,
    pub max_requests: u32,
    pub window_secs: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy: RateLimiterStrategy::TokenBucket,
            max_requests: 100,
            window_secs: 60,
        }
    }
}

/// Per-backend circuit breaking.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub timeout_secs: u64,
    pub half_open_requests: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            timeout_secs: 30,
            half_open_requests: 1,
        }
    }
}

/// Active + passive health checking with hysteresis.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HealthCheckConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub path: String,
    pub expected_status_min: u16,
    pub expected_status_max: u16,
    pub failure_threshold: u32,
    pub success_threshold: u32,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10,
            timeout_secs: 5,
            path: "/health".to_string(),
            expected_status_min: 200,
            expected_status_max: 399,
            failure_threshold: 3,
            success_threshold: 2,
        }
    }
}

/// CORS policy applied to every response (including errors) when enabled.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CorsConfig {
    pub enabled: bool,
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_origins: Vec::new(),
            allowed_methods: vec![
                "GET".into(),
                "POST".into(),
                "PUT".into(),
                "DELETE".into(),
                "OPTIONS".into(),
            ],
            allowed_headers: vec!["Content-Type".into(), "Authorization".into()],
            allow_credentials: false,
            max_age_secs: 3600,
        }
    }
}

/// A stored Basic-auth credential: `SHA-256(salt + password)`, hex encoded.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BasicAuthEntry {
    pub username: String,
    pub salt: String,
    pub password_hash: String,
}

/// Admin surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdminConfig {
    pub enabled: bool,
    /// Bearer API key. Empty means this auth method is not configured.
    pub api_key: String,
    pub basic_auth: Vec<BasicAuthEntry>,
    /// CIDR blocks (IPv4 or IPv6) allowed to reach `/admin/*` without
    /// further authentication.
    pub ip_whitelist: Vec<String>,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            basic_auth: Vec::new(),
            ip_whitelist: Vec::new(),
        }
    }
}

/// Timeout configuration for the various stages of a proxied request.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeoutConfig {
    pub connect_secs: u64,
    pub request_secs: u64,
    pub idle_secs: u64,
    pub keep_alive_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            idle_secs: 300,
            keep_alive_secs: 120,
        }
    }
}

/// Hard limits enforced before or during parsing.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LimitsConfig {
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: 8 * 1024,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// ACME / automatic certificate issuance. Non-functional: an aspiration the
/// config shape carries but the core does not implement (see DESIGN.md).
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct AutoHttpsConfig {
    pub enabled: bool,
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_enabled: bool,
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
