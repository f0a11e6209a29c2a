//! Proxy handler: forward a client request to a backend and relay the
//! response back, retrying across alternates on failure.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::schema::{CircuitBreakerConfig, HealthCheckConfig, TimeoutConfig};
use crate::error::ProxyError;
use crate::health;
use crate::http1::{self, HeaderList, Request};
use crate::load_balancer::backend::Backend;
use crate::net::conn_pool::ConnectionPool;
use crate::net::connection::ClientConnection;
use crate::resilience::backoff;
use crate::resilience::circuit_breaker::CircuitBreakerRegistry;
use crate::resilience::retries::{is_retryable, RetryBudget};
use crate::resilience::timeouts;
use crate::routing::router::ResolvedRoute;
use crate::security::headers::{apply_forwarding_headers, strip_hop_by_hop};

/// Attempts against the primary backend before falling back to alternates.
const MAX_RETRIES: u32 = 2;

pub struct ProxyOutcome {
    pub status: u16,
    pub bytes_sent: u64,
}

pub struct ProxyContext<'a> {
    pub conn_pool: &'a ConnectionPool,
    pub circuit_breakers: &'a CircuitBreakerRegistry,
    pub circuit_breaker_config: &'a CircuitBreakerConfig,
    pub health_config: &'a HealthCheckConfig,
    pub timeouts: &'a TimeoutConfig,
    pub retry_budget: &'a RetryBudget,
    pub client_ip: IpAddr,
    pub is_tls: bool,
    pub original_host: String,
    pub request_id: String,
}

/// Forward `request` to `route.backend`, retrying `MAX_RETRIES` times
/// against it and then once against each alternate. `body_prefix` is
/// whatever the dispatch loop already read past the header block (the
/// start of the request body, possibly all of it).
pub async fn proxy_request(
    client: &mut ClientConnection,
    request: &Request,
    body_prefix: &[u8],
    route: &ResolvedRoute,
    ctx: &ProxyContext<'_>,
) -> Result<ProxyOutcome, ProxyError> {
    ctx.retry_budget.record_request();

    let mut plan: Vec<(Arc<Backend>, u32)> = vec![(route.backend.clone(), MAX_RETRIES + 1)];
    for alternate in &route.alternates {
        plan.push((alternate.clone(), 1));
    }

    let mut last_error = ProxyError::BadGateway("no healthy backend available".to_string());
    let mut attempted_once = false;
    // dispatch() already ran circuit-breaker admission for the primary
    // backend's first attempt (it's what decides whether to call us at
    // all); checking again here would consume a second half-open probe
    // slot and wedge the breaker when half_open_requests is 1.
    let mut already_admitted = true;

    'backends: for (backend, attempts) in plan {
        for attempt_index in 0..attempts {
            if attempted_once && !ctx.retry_budget.can_retry() {
                break 'backends;
            }
            if attempt_index > 0 {
                tokio::time::sleep(backoff::calculate_backoff(attempt_index, 20, 200)).await;
            }
            attempted_once = true;

            if already_admitted {
                already_admitted = false;
            } else if !ctx.circuit_breakers.allow(&backend.url, ctx.circuit_breaker_config) {
                last_error = ProxyError::BadGateway(format!("circuit open for {}", backend.url));
                continue;
            }

            let guard = backend.connection_guard();
            let result = tokio::time::timeout(
                Duration::from_secs(ctx.timeouts.request_secs),
                attempt_once(client, request, body_prefix, &backend, ctx),
            )
            .await;
            drop(guard);

            match result {
                Ok(Ok(outcome)) => {
                    ctx.circuit_breakers.record_success(&backend.url);
                    health::record_proxy_outcome(&backend, Some(outcome.status), ctx.health_config);
                    return Ok(outcome);
                }
                Ok(Err(e)) => {
                    let status = status_of(&e);
                    let connection_error = matches!(e, ProxyError::Io(_));
                    ctx.circuit_breakers.record_failure(&backend.url, ctx.circuit_breaker_config);
                    health::record_proxy_outcome(&backend, status, ctx.health_config);
                    let retryable = is_retryable(&request.method, status, connection_error);
                    last_error = e;
                    if !retryable {
                        return Err(last_error);
                    }
                    let _ = attempt_index;
                }
                Err(_) => {
                    ctx.circuit_breakers.record_failure(&backend.url, ctx.circuit_breaker_config);
                    health::record_proxy_outcome(&backend, None, ctx.health_config);
                    last_error = ProxyError::GatewayTimeout;
                    if !is_retryable(&request.method, None, true) {
                        return Err(last_error);
                    }
                }
            }
        }
    }

    Err(last_error)
}

fn status_of(error: &ProxyError) -> Option<u16> {
    match error {
        ProxyError::BadGateway(_) | ProxyError::GatewayTimeout => None,
        other => Some(other.status()),
    }
}

/// A single attempt against one backend: acquire a connection, forward
/// headers and body, relay the response back to the client.
async fn attempt_once(
    client: &mut ClientConnection,
    request: &Request,
    body_prefix: &[u8],
    backend: &Backend,
    ctx: &ProxyContext<'_>,
) -> Result<ProxyOutcome, ProxyError> {
    let mut conn = tokio::time::timeout(
        Duration::from_secs(ctx.timeouts.connect_secs),
        ctx.conn_pool.acquire(&backend.host, backend.port),
    )
    .await
    .map_err(|_| ProxyError::GatewayTimeout)??;

    let mut headers = request.headers.clone();
    strip_hop_by_hop(&mut headers);
    apply_forwarding_headers(
        &mut headers,
        ctx.client_ip,
        ctx.is_tls,
        &ctx.original_host,
        &backend.host_port(),
        &ctx.request_id,
    );
    headers.push("Connection", "close");

    let head = render_request_head(request, &headers);
    conn.write_all(head.as_bytes()).await?;

    if request.chunked {
        let mut client_body = http1::PrefixedReader::new(body_prefix, &mut *client);
        http1::relay_chunked_body(&mut client_body, &mut conn).await?;
    } else if request.body_length > 0 {
        let mut client_body = http1::PrefixedReader::new(body_prefix, &mut *client);
        http1::relay_fixed_body(&mut client_body, &mut conn, request.body_length).await?;
    }
    conn.flush().await?;

    let response = read_response(&mut conn, ctx).await?;
    let bytes_sent = write_response_to_client(client, &mut conn, &response, &ctx.request_id).await?;

    ctx.conn_pool.release(&backend.host, backend.port, conn).await;

    Ok(ProxyOutcome { status: response.head.status, bytes_sent })
}

struct BackendResponse {
    head: http1::ResponseHead,
    already_read_body: Vec<u8>,
}

async fn read_response(conn: &mut TcpStream, ctx: &ProxyContext<'_>) -> Result<BackendResponse, ProxyError> {
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(end) = http1::find_header_end(&buf) {
            break end;
        }
        let n = timeouts::with_timeout(Duration::from_secs(ctx.timeouts.request_secs), conn.read(&mut chunk)).await?;
        if n == 0 {
            return Err(ProxyError::BadGateway("backend closed before sending headers".to_string()));
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.len() > 64 * 1024 {
            return Err(ProxyError::BadGateway("backend response headers too large".to_string()));
        }
    };

    let head = http1::parse_response_head(&buf)?;
    let already_read_body = buf[header_end..].to_vec();
    Ok(BackendResponse { head, already_read_body })
}

async fn write_response_to_client(
    client: &mut ClientConnection,
    conn: &mut TcpStream,
    response: &BackendResponse,
    request_id: &str,
) -> Result<u64, ProxyError> {
    let mut headers = response.head.headers.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove("x-request-id");
    headers.push("X-Request-Id", request_id);

    let reason = if response.head.reason.is_empty() {
        crate::error::reason_phrase(response.head.status).to_string()
    } else {
        response.head.reason.clone()
    };
    let mut head_text = format!("HTTP/1.1 {} {}\r\n", response.head.status, reason);
    for (name, value) in headers.iter() {
        head_text.push_str(name);
        head_text.push_str(": ");
        head_text.push_str(value);
        head_text.push_str("\r\n");
    }
    head_text.push_str("\r\n");
    client.write_all(head_text.as_bytes()).await?;
    let mut bytes_sent = head_text.len() as u64;

    let chunked = response.head.headers.contains_token("transfer-encoding", "chunked");
    let content_length = response
        .head
        .headers
        .get("content-length")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(0);

    let mut backend_body = http1::PrefixedReader::new(&response.already_read_body, &mut *conn);
    if chunked {
        // Chunk framing bytes count toward the wire but aren't tallied here;
        // metrics report header bytes plus fixed-length bodies precisely.
        http1::relay_chunked_body(&mut backend_body, client).await?;
    } else if content_length > 0 {
        http1::relay_fixed_body(&mut backend_body, client, content_length).await?;
        bytes_sent += content_length;
    }
    client.flush().await?;

    Ok(bytes_sent)
}

fn render_request_head(request: &Request, headers: &HeaderList) -> String {
    let mut out = format!("{} {} {}\r\n", request.method, request.target(), request.version);
    for (name, value) in headers.iter() {
        out.push_str(name);
        out.push_str(": ");
        out.push_str(value);
        out.push_str("\r\n");
    }
    out.push_str("\r\n");
    out
}
