//! Admin JSON endpoints, hand-rolled since the proxy carries no HTTP
//! framework: each handler builds its own JSON body and the dispatcher
//! renders it into a raw HTTP/1.1 response.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::config::loader::load_config;
use crate::error::reason_phrase;
use crate::http1::Request;
use crate::http::server::AppState;

const KNOWN_PATHS: &[&str] = &[
    "/admin/health",
    "/admin/metrics",
    "/admin/stats",
    "/admin/routes",
    "/admin/routes/reload",
    "/admin/circuits",
    "/admin/circuits/reset",
    "/admin/ratelimit",
    "/admin/ratelimit/reset",
    "/admin/backends",
    "/admin/config",
    "/admin/config/update",
];

pub struct AdminResponse {
    pub status: u16,
    content_type: &'static str,
    body: String,
}

impl AdminResponse {
    fn json(status: u16, body: impl Serialize) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: serde_json::to_string(&body).unwrap_or_else(|_| "{}".to_string()),
        }
    }

    fn text(status: u16, content_type: &'static str, body: String) -> Self {
        Self { status, content_type, body }
    }

    pub fn into_bytes(self, request_id: &str) -> Vec<u8> {
        let reason = reason_phrase(self.status);
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, reason);
        head.push_str(&format!("Content-Type: {}\r\n", self.content_type));
        head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        head.push_str("Access-Control-Allow-Origin: *\r\n");
        head.push_str(&format!("X-Request-Id: {}\r\n", request_id));
        head.push_str("Connection: close\r\n\r\n");
        head.push_str(&self.body);
        head.into_bytes()
    }
}

pub async fn dispatch(request: &Request, body: &[u8], state: &Arc<AppState>) -> AdminResponse {
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/admin/health") => health(state),
        ("GET", "/admin/metrics") => metrics_text(state),
        ("GET", "/admin/stats") => stats(state),
        ("GET", "/admin/routes") => routes(state),
        ("POST", "/admin/routes/reload") => reload(state),
        ("GET", "/admin/circuits") => circuits(state),
        ("POST", "/admin/circuits/reset") => circuits_reset(request, state),
        ("GET", "/admin/ratelimit") => ratelimit(state),
        ("POST", "/admin/ratelimit/reset") => ratelimit_reset(state),
        ("GET", "/admin/backends") => backends(state),
        ("GET", "/admin/config") => config_features(),
        ("POST", "/admin/config/update") => config_update(body, state),
        (_, path) if KNOWN_PATHS.contains(&path) => {
            AdminResponse::json(405, json!({"error": "method not allowed"}))
        }
        _ => AdminResponse::json(404, json!({"error": "not found"})),
    }
}

fn health(state: &Arc<AppState>) -> AdminResponse {
    AdminResponse::json(
        200,
        json!({
            "status": "ok",
            "uptime_seconds": state.uptime_secs(),
            "timestamp": httpdate::fmt_http_date(std::time::SystemTime::now()),
            "version": env!("CARGO_PKG_VERSION"),
        }),
    )
}

fn metrics_text(state: &Arc<AppState>) -> AdminResponse {
    AdminResponse::text(200, "text/plain; version=0.0.4", state.metrics.render())
}

fn stats(state: &Arc<AppState>) -> AdminResponse {
    AdminResponse::json(
        200,
        json!({
            "uptime_seconds": state.uptime_secs(),
            "backend_count": state.backend_registry.all().len(),
            "rate_limiter_active_clients": state.rate_limiter.active_client_count(),
            "rate_limiter_total_rejected": state.rate_limiter.total_rejected(),
        }),
    )
}

fn routes(state: &Arc<AppState>) -> AdminResponse {
    match std::fs::read_to_string(&state.config_path) {
        Ok(contents) => AdminResponse::text(200, "application/json", contents),
        Err(e) => AdminResponse::json(500, json!({"error": e.to_string()})),
    }
}

fn reload(state: &Arc<AppState>) -> AdminResponse {
    match load_config(&state.config_path) {
        Ok(config) => {
            state.apply_config_update(config);
            AdminResponse::json(200, json!({"status": "reloaded"}))
        }
        Err(e) => AdminResponse::json(400, json!({"status": "error", "message": e.to_string()})),
    }
}

fn circuits(state: &Arc<AppState>) -> AdminResponse {
    let entries: Vec<_> = state
        .backend_registry
        .all()
        .iter()
        .map(|b| {
            json!({
                "url": b.url,
                "state": state.circuit_breakers.state(&b.url),
                "healthy": b.is_healthy(),
            })
        })
        .collect();
    AdminResponse::json(200, json!({"circuits": entries}))
}

fn circuits_reset(request: &Request, state: &Arc<AppState>) -> AdminResponse {
    match query_param(request, "backend") {
        Some(backend) => state.circuit_breakers.reset(&backend),
        None => state.circuit_breakers.clear(),
    }
    AdminResponse::json(200, json!({"status": "reset"}))
}

fn ratelimit(state: &Arc<AppState>) -> AdminResponse {
    let config = state.config.load();
    AdminResponse::json(
        200,
        json!({
            "enabled": config.rate_limiter.enabled,
            "strategy": config.rate_limiter.strategy,
            "max_requests": config.rate_limiter.max_requests,
            "window_secs": config.rate_limiter.window_secs,
            "active_clients": state.rate_limiter.active_client_count(),
            "total_rejected": state.rate_limiter.total_rejected(),
        }),
    )
}

fn ratelimit_reset(state: &Arc<AppState>) -> AdminResponse {
    state.rate_limiter.reset();
    AdminResponse::json(200, json!({"status": "reset"}))
}

fn backends(state: &Arc<AppState>) -> AdminResponse {
    let entries: Vec<_> = state
        .backend_registry
        .all()
        .iter()
        .map(crate::health::state::snapshot)
        .collect();
    AdminResponse::json(200, json!({"backends": entries}))
}

fn config_features() -> AdminResponse {
    AdminResponse::json(
        200,
        json!({
            "features": [
                "path-routing", "domain-routing", "round-robin", "weighted-round-robin",
                "least-connections", "ip-hash", "circuit-breaker", "active-health-check",
                "passive-health-check", "rate-limiting", "static-file-serving",
                "websocket-proxy", "cors", "hot-reload",
            ]
        }),
    )
}

fn config_update(body: &[u8], state: &Arc<AppState>) -> AdminResponse {
    let config: crate::config::schema::ProxyConfig = match serde_json::from_slice(body) {
        Ok(config) => config,
        Err(e) => return AdminResponse::json(400, json!({"status": "error", "message": e.to_string()})),
    };
    match crate::config::validation::validate_config(&config) {
        Ok(()) => {
            state.apply_config_update(config);
            AdminResponse::json(200, json!({"status": "updated"}))
        }
        Err(errors) => {
            let messages: Vec<String> = errors.into_iter().map(|e| e.0).collect();
            AdminResponse::json(400, json!({"status": "error", "errors": messages}))
        }
    }
}

fn query_param(request: &Request, name: &str) -> Option<String> {
    let query = request.query.as_deref()?;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}
