//! HTTP server setup and per-connection dispatch.
//!
//! Replaces a framework-based router with a direct accept loop: each
//! connection is read, parsed, and dispatched by hand against the pipeline
//! described in the reverse proxy design (CORS preflight, rate limiting,
//! admin routing, backend resolution, circuit breaking, then one of
//! proxy/static/websocket).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_rustls::TlsAcceptor;

use crate::admin;
use crate::config::schema::ProxyConfig;
use crate::error::ProxyError;
use crate::health::HealthMonitor;
use crate::http::{proxy, static_handler, websocket};
use crate::http1;
use crate::load_balancer::pool::BackendRegistry;
use crate::net::connection::ClientConnection;
use crate::net::conn_pool::ConnectionPool;
use crate::net::listener::Listener;
use crate::observability::metrics;
use crate::resilience::circuit_breaker::CircuitBreakerRegistry;
use crate::resilience::retries::RetryBudget;
use crate::routing::router::Router;
use crate::security::cors::CorsDecision;
use crate::security::rate_limit::RateLimiter;
use crate::security::limits;

/// Every piece of process-wide state a connection's dispatch loop needs,
/// kept behind `Arc` so cloning it per connection is cheap. `config` is
/// swapped atomically on reload; everything that reads from it takes a
/// fresh snapshot with `ArcSwap::load`.
pub struct AppState {
    pub config: ArcSwap<ProxyConfig>,
    pub router: Arc<Router>,
    pub backend_registry: Arc<BackendRegistry>,
    pub rate_limiter: Arc<RateLimiter>,
    pub circuit_breakers: Arc<CircuitBreakerRegistry>,
    pub retry_budget: Arc<RetryBudget>,
    pub conn_pool: Arc<ConnectionPool>,
    pub metrics: PrometheusHandle,
    pub start_time: Instant,
    pub config_path: PathBuf,
    active_connections: AtomicI64,
}

impl AppState {
    pub fn new(config: ProxyConfig, config_path: PathBuf, metrics: PrometheusHandle) -> Arc<Self> {
        let registry = Arc::new(BackendRegistry::new());
        let router = Arc::new(Router::new(&config, registry.clone()));
        Arc::new(Self {
            config: ArcSwap::from_pointee(config),
            router,
            backend_registry: registry,
            rate_limiter: Arc::new(RateLimiter::new()),
            circuit_breakers: Arc::new(CircuitBreakerRegistry::new()),
            retry_budget: Arc::new(RetryBudget::new(0.1, 100)),
            conn_pool: Arc::new(ConnectionPool::new()),
            metrics,
            start_time: Instant::now(),
            config_path,
            active_connections: AtomicI64::new(0),
        })
    }

    pub fn apply_config_update(&self, new_config: ProxyConfig) {
        self.router.update(&new_config);
        self.config.store(Arc::new(new_config));
        tracing::info!("configuration reload applied");
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn connection_opened(&self) {
        let n = self.active_connections.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::set_active_connections(n);
    }

    fn connection_closed(&self) {
        let n = self.active_connections.fetch_sub(1, Ordering::Relaxed) - 1;
        metrics::set_active_connections(n);
    }
}

/// The HTTP server: owns the shared state and drives the accept loop.
pub struct HttpServer {
    state: Arc<AppState>,
}

impl HttpServer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Accept connections until `shutdown` fires. `config_updates` carries
    /// validated configs from the file watcher; each one is applied via an
    /// atomic swap. `tls_acceptor` is `Some` when the listener config named
    /// a certificate and key.
    pub async fn run(
        self,
        listener: Listener,
        tls_acceptor: Option<TlsAcceptor>,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ProxyError> {
        tracing::info!(address = %listener.local_addr()?, "HTTP server starting");

        let state = self.state.clone();
        let mut reload_shutdown = shutdown.resubscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(new_config) = config_updates.recv() => {
                        state.apply_config_update(new_config);
                    }
                    _ = reload_shutdown.recv() => break,
                    else => break,
                }
            }
        });

        if self.state.config.load().health_check.enabled {
            let monitor = HealthMonitor::new(self.state.backend_registry.clone());
            let monitor_state = self.state.clone();
            let mut health_shutdown = shutdown.resubscribe();
            tokio::spawn(async move {
                tokio::select! {
                    _ = monitor.run(|| monitor_state.config.load().health_check.clone()) => {},
                    _ = health_shutdown.recv() => {},
                }
            });
        }

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer_addr, permit) = match accepted {
                        Ok(v) => v,
                        Err(e) => {
                            tracing::warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let state = self.state.clone();
                    let tls_acceptor = tls_acceptor.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        handle_connection(state, stream, peer_addr, tls_acceptor).await;
                    });
                }
                _ = shutdown.recv() => {
                    tracing::info!("HTTP server initiating graceful shutdown");
                    break;
                }
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn handle_connection(
    state: Arc<AppState>,
    stream: TcpStream,
    peer_addr: SocketAddr,
    tls_acceptor: Option<TlsAcceptor>,
) {
    let _ = stream.set_nodelay(true);
    let is_tls = tls_acceptor.is_some();

    let mut client = match tls_acceptor {
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(tls) => ClientConnection::Tls(Box::new(tls)),
            Err(e) => {
                tracing::debug!(error = %e, peer = %peer_addr, "TLS handshake failed");
                return;
            }
        },
        None => ClientConnection::Plain(stream),
    };

    state.connection_opened();
    let opened_at = Instant::now();

    loop {
        match serve_one_request(&state, &mut client, peer_addr, is_tls).await {
            Ok(keep_alive) if keep_alive => continue,
            _ => break,
        }
    }

    metrics::record_connection_duration_ms(opened_at.elapsed().as_secs_f64() * 1000.0);
    state.connection_closed();
}

/// Read, parse, and dispatch a single request. Returns `Ok(true)` if the
/// connection should stay open for another request.
async fn serve_one_request(
    state: &Arc<AppState>,
    client: &mut ClientConnection,
    peer_addr: SocketAddr,
    is_tls: bool,
) -> Result<bool, ProxyError> {
    let config = state.config.load_full();
    let started = Instant::now();
    let request_id = crate::observability::tracing::new_request_id();

    let (request, body_prefix) = match read_request(client, &config.limits).await {
        Ok(Some(v)) => v,
        Ok(None) => return Ok(false),
        Err(e) => {
            let bytes = e.into_response_bytes(None, &request_id);
            let _ = client.write_all(&bytes).await;
            return Ok(false);
        }
    };

    let client_ip = peer_addr.ip();
    let origin = request.headers.get("origin").map(|s| s.to_string());
    let request_method_header = request.headers.get("access-control-request-method").map(|s| s.to_string());

    let preflight = config.cors.enabled
        && CorsDecision::is_preflight_request(&request.method, origin.as_deref(), request_method_header.as_deref());
    let cors = CorsDecision::evaluate(&config.cors, origin.as_deref(), preflight);

    let outcome = dispatch(
        state,
        &config,
        client,
        &request,
        &body_prefix,
        client_ip,
        is_tls,
        preflight,
        cors.as_ref(),
        &request_id,
    )
    .await;

    let status = match &outcome {
        Ok(status) => *status,
        Err(e) => {
            let bytes = e.into_response_bytes(cors.as_ref(), &request_id);
            let status = e.status();
            let _ = client.write_all(&bytes).await;
            status
        }
    };

    metrics::record_request(&request.method, status, started.elapsed().as_secs_f64() * 1000.0);
    tracing::info!(
        request_id = %request_id,
        method = %request.method,
        path = %request.path,
        status,
        client_ip = %client_ip,
        duration_ms = started.elapsed().as_secs_f64() * 1000.0,
        "request handled"
    );

    Ok(!request.headers.contains_token("connection", "close"))
}

#[allow(clippy::too_many_arguments)]
async fn dispatch(
    state: &Arc<AppState>,
    config: &ProxyConfig,
    client: &mut ClientConnection,
    request: &http1::Request,
    body_prefix: &[u8],
    client_ip: std::net::IpAddr,
    is_tls: bool,
    preflight: bool,
    cors: Option<&CorsDecision>,
    request_id: &str,
) -> Result<u16, ProxyError> {
    if preflight {
        let mut lines = vec!["HTTP/1.1 204 No Content".to_string()];
        if let Some(cors) = cors {
            cors.append_headers(&mut lines);
        }
        lines.push("Content-Length: 0".to_string());
        lines.push(format!("X-Request-Id: {}", request_id));
        lines.push(String::new());
        client.write_all(lines.join("\r\n").as_bytes()).await?;
        return Ok(204);
    }

    if config.rate_limiter.enabled {
        let decision = state.rate_limiter.allow(client_ip, &request.path, &config.rate_limiter);
        if !decision.admitted {
            metrics::record_rate_limit_rejection();
            return Err(ProxyError::RateLimited {
                retry_after: Duration::from_secs(decision.reset_secs),
                remaining: decision.remaining,
                reset: decision.reset_secs,
            });
        }
    }

    if request.path == "/metrics" {
        let body = state.metrics.render();
        let mut lines = vec!["HTTP/1.1 200 OK".to_string(), "Content-Type: text/plain; version=0.0.4".to_string()];
        lines.push(format!("Content-Length: {}", body.len()));
        lines.push("Connection: close".to_string());
        lines.push(format!("X-Request-Id: {}", request_id));
        lines.push(String::new());
        lines.push(body);
        client.write_all(lines.join("\r\n").as_bytes()).await?;
        return Ok(200);
    }

    if request.path.starts_with("/admin/") {
        if !config.admin.enabled {
            return Err(ProxyError::NotFound);
        }
        admin::auth::authenticate(request, client_ip, &config.admin)?;
        let response = admin::handlers::dispatch(request, body_prefix, state).await;
        let status = response.status;
        client.write_all(&response.into_bytes(request_id)).await?;
        return Ok(status);
    }

    if let Some(root) = state.router.resolve_file_root(request.host.as_deref(), &request.path) {
        if request.is_websocket_upgrade() {
            return Err(ProxyError::BadRequest);
        }
        let outcome =
            static_handler::serve(client, &root, request, &std::collections::HashMap::new(), request_id).await?;
        metrics::record_bytes(request.body_length, outcome.bytes_sent);
        return Ok(outcome.status);
    }

    let route = state
        .router
        .resolve(request.host.as_deref(), &request.path, client_ip)
        .ok_or(ProxyError::NotFound)?;

    if config.circuit_breaker.enabled && !state.circuit_breakers.allow(&route.backend.url, &config.circuit_breaker) {
        return Err(ProxyError::CircuitOpen);
    }

    if request.is_websocket_upgrade() {
        websocket::proxy_upgrade(client, request, body_prefix, &route.backend.host, route.backend.port, request_id)
            .await?;
        return Ok(101);
    }

    let ctx = proxy::ProxyContext {
        conn_pool: &state.conn_pool,
        circuit_breakers: &state.circuit_breakers,
        circuit_breaker_config: &config.circuit_breaker,
        health_config: &config.health_check,
        timeouts: &config.timeouts,
        retry_budget: &state.retry_budget,
        client_ip,
        is_tls,
        original_host: request.host.clone().unwrap_or_default(),
        request_id: request_id.to_string(),
    };
    let outcome = proxy::proxy_request(client, request, body_prefix, &route, &ctx).await?;
    metrics::record_backend_request(&route.backend.url, outcome.status < 500);
    metrics::record_bytes(request.body_length, outcome.bytes_sent);
    Ok(outcome.status)
}

/// Read from the client until a full header block is available. Returns
/// `None` if the peer closed the connection before sending any bytes (a
/// clean keep-alive end).
async fn read_request(
    client: &mut ClientConnection,
    limits_config: &crate::config::schema::LimitsConfig,
) -> Result<Option<(http1::Request, Vec<u8>)>, ProxyError> {
    use tokio::io::AsyncReadExt;

    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    loop {
        if http1::find_header_end(&buf).is_some() {
            break;
        }
        limits::check_header_bytes(buf.len(), limits_config)?;
        let n = client.read(&mut chunk).await?;
        if n == 0 {
            return if buf.is_empty() { Ok(None) } else { Err(ProxyError::BadRequest) };
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let request = http1::parse_request_head(&buf)?;
    limits::check_body_bytes(request.body_length, limits_config)?;
    let body_prefix = buf[request.header_length..].to_vec();
    Ok(Some((request, body_prefix)))
}
