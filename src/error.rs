//! Proxy-wide error hierarchy.
//!
//! Every handler converts its internal failures into a `ProxyError` before
//! returning; this is the single place status codes, bodies, and required
//! headers (CORS, `Retry-After`, `WWW-Authenticate`) are decided.

use std::time::Duration;

use crate::security::cors::CorsDecision;

/// A proxy-level failure, carrying enough context to render a response.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("malformed request")]
    BadRequest,

    #[error("no matching route")]
    NotFound,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("admin authentication failed")]
    Unauthorized,

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("rate limit exceeded")]
    RateLimited { retry_after: Duration, remaining: u32, reset: u64 },

    #[error("circuit open for backend")]
    CircuitOpen,

    #[error("bad gateway: {0}")]
    BadGateway(String),

    #[error("gateway timeout")]
    GatewayTimeout,

    #[error("range not satisfiable, resource size {size}")]
    RangeNotSatisfiable { size: u64 },

    #[error("payload too large")]
    PayloadTooLarge,

    #[error("request header fields too large")]
    HeaderFieldsTooLarge,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl ProxyError {
    pub fn status(&self) -> u16 {
        match self {
            ProxyError::BadRequest => 400,
            ProxyError::NotFound => 404,
            ProxyError::Forbidden(_) => 403,
            ProxyError::Unauthorized => 401,
            ProxyError::MethodNotAllowed => 405,
            ProxyError::RateLimited { .. } => 429,
            ProxyError::CircuitOpen => 503,
            ProxyError::BadGateway(_) => 502,
            ProxyError::GatewayTimeout => 504,
            ProxyError::RangeNotSatisfiable { .. } => 416,
            ProxyError::PayloadTooLarge => 413,
            ProxyError::HeaderFieldsTooLarge => 431,
            ProxyError::Io(_) => 500,
            ProxyError::Config(_) => 500,
        }
    }

    /// Render this error as a raw HTTP/1.1 response, optionally decorated
    /// with CORS headers when the request carried an allowed `Origin`.
    /// `request_id` is echoed back as `X-Request-Id` so a failed request is
    /// as traceable as a successful one.
    pub fn into_response_bytes(self, cors: Option<&CorsDecision>, request_id: &str) -> Vec<u8> {
        let status = self.status();
        let reason = reason_phrase(status);

        let (content_type, body): (&str, String) = match &self {
            ProxyError::BadGateway(cause) => (
                "application/json",
                format!(
                    r#"{{"error":"Bad Gateway","message":"{}"}}"#,
                    json_escape(cause)
                ),
            ),
            ProxyError::Unauthorized => ("text/plain", "Unauthorized".to_string()),
            ProxyError::RateLimited { .. } => ("text/plain", "Too Many Requests".to_string()),
            other => ("text/plain", other.to_string()),
        };

        let mut headers = vec![
            format!("Content-Type: {}", content_type),
            format!("Content-Length: {}", body.len()),
            "Connection: close".to_string(),
            format!("X-Request-Id: {}", request_id),
        ];

        match &self {
            ProxyError::Unauthorized => {
                headers.push("WWW-Authenticate: Basic realm=\"admin\"".to_string());
            }
            ProxyError::RateLimited { retry_after, remaining, reset } => {
                headers.push(format!("Retry-After: {}", retry_after.as_secs()));
                headers.push(format!("X-RateLimit-Remaining: {}", remaining));
                headers.push(format!("X-RateLimit-Reset: {}", reset));
            }
            ProxyError::RangeNotSatisfiable { size } => {
                headers.push(format!("Content-Range: bytes */{}", size));
            }
            _ => {}
        }

        if let Some(cors) = cors {
            cors.append_headers(&mut headers);
        }

        let mut out = format!("HTTP/1.1 {} {}\r\n", status, reason);
        for h in headers {
            out.push_str(&h);
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
        out.push_str(&body);
        out.into_bytes()
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        304 => "Not Modified",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        413 => "Payload Too Large",
        416 => "Range Not Satisfiable",
        431 => "Request Header Fields Too Large",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        101 => "Switching Protocols",
        _ => "Unknown",
    }
}

fn json_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}
