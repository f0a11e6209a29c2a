//! Failure injection tests for the reverse proxy.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reverse_proxy::config::{PathRoute, ProxyConfig};
use reverse_proxy::http::server::{AppState, HttpServer};
use reverse_proxy::lifecycle::Shutdown;
use reverse_proxy::net::listener::Listener;

mod common;

async fn run_server(config: ProxyConfig) -> (SocketAddr, Arc<Shutdown>) {
    let listener = Listener::bind(&config.listener).await.expect("bind listener");
    let addr = listener.local_addr().unwrap();

    let metrics = common::shared_metrics_handle();
    let state = AppState::new(config, PathBuf::from("unused.json"), metrics);
    let shutdown = Arc::new(Shutdown::new());

    let (_tx, config_updates) = tokio::sync::mpsc::unbounded_channel();
    let server = HttpServer::new(state);
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, None, config_updates, server_shutdown).await;
    });

    (addr, shutdown)
}

#[tokio::test]
async fn test_retry_on_failure() {
    let backend_addr: SocketAddr = "127.0.0.1:28181".parse().unwrap();

    let call_count = Arc::new(AtomicU32::new(0));
    let cc = call_count.clone();
    common::start_programmable_backend(backend_addr, move || {
        let cc = cc.clone();
        async move {
            let count = cc.fetch_add(1, Ordering::SeqCst);
            if count < 2 {
                (503, "Service Unavailable".into())
            } else {
                (200, "Success".into())
            }
        }
    })
    .await;

    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.path_routes.push(PathRoute {
        prefix: "/".to_string(),
        backends: vec![format!("http://{}", backend_addr)],
    });
    config.health_check.enabled = false;
    config.circuit_breaker.enabled = false;

    let (addr, shutdown) = run_server(config).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let client = reqwest::Client::builder().pool_max_idle_per_host(0).no_proxy().build().unwrap();
    let res = client.get(format!("http://{}", addr)).send().await.expect("proxy unreachable");

    assert_eq!(res.status(), 200, "should eventually succeed after retries");
    assert!(call_count.load(Ordering::SeqCst) >= 3, "should have attempted at least 3 times");

    shutdown.trigger();
}

#[tokio::test]
async fn test_health_check_eviction() {
    let b1_addr: SocketAddr = "127.0.0.1:28281".parse().unwrap();
    let b2_addr: SocketAddr = "127.0.0.1:28282".parse().unwrap();

    common::start_mock_backend(b1_addr, "b1").await;

    let b2_healthy = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let b2h = b2_healthy.clone();
    common::start_programmable_backend(b2_addr, move || {
        let b2h = b2h.clone();
        async move {
            if b2h.load(Ordering::SeqCst) {
                (200, "b2".into())
            } else {
                (500, "dead".into())
            }
        }
    })
    .await;

    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.path_routes.push(PathRoute {
        prefix: "/".to_string(),
        backends: vec![format!("http://{}", b1_addr), format!("http://{}", b2_addr)],
    });
    config.health_check.enabled = true;
    config.health_check.path = "/health".to_string();
    config.health_check.interval_secs = 1;
    config.health_check.failure_threshold = 2;
    config.health_check.success_threshold = 1;
    config.circuit_breaker.enabled = false;

    let (addr, shutdown) = run_server(config).await;
    tokio::time::sleep(Duration::from_secs(2)).await;

    let client = reqwest::Client::builder().no_proxy().build().unwrap();

    let mut b1_hits = 0;
    let mut b2_hits = 0;
    for _ in 0..20 {
        if let Ok(res) = client.get(format!("http://{}", addr)).send().await {
            if let Ok(body) = res.text().await {
                if body == "b1" {
                    b1_hits += 1;
                }
                if body == "b2" {
                    b2_hits += 1;
                }
            }
        }
    }
    assert!(b1_hits > 0, "b1 should have hits (got {})", b1_hits);
    assert!(b2_hits > 0, "b2 should have hits (got {})", b2_hits);

    b2_healthy.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(3)).await;

    b1_hits = 0;
    b2_hits = 0;
    for _ in 0..10 {
        if let Ok(res) = client.get(format!("http://{}", addr)).send().await {
            if let Ok(body) = res.text().await {
                if body == "b1" {
                    b1_hits += 1;
                }
                if body == "b2" {
                    b2_hits += 1;
                }
            }
        }
    }
    assert_eq!(b1_hits, 10, "only b1 should be hit after b2 eviction");
    assert_eq!(b2_hits, 0, "b2 should have 0 hits after eviction");

    shutdown.trigger();
}

#[tokio::test]
async fn test_circuit_breaker_opens_after_threshold() {
    // Nothing listens on this port: every connection attempt fails
    // immediately, which is what the circuit breaker reacts to (unlike
    // application-level 5xx responses, which only feed passive health
    // checking, not the breaker).
    let dead_backend: SocketAddr = "127.0.0.1:28382".parse().unwrap();

    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.path_routes.push(PathRoute {
        prefix: "/".to_string(),
        backends: vec![format!("http://{}", dead_backend)],
    });
    config.health_check.enabled = false;
    config.circuit_breaker.enabled = true;
    config.circuit_breaker.failure_threshold = 2;
    config.circuit_breaker.timeout_secs = 60;

    let (addr, shutdown) = run_server(config).await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let client = reqwest::Client::builder().pool_max_idle_per_host(0).no_proxy().build().unwrap();

    // First request exhausts retries against the single (unreachable)
    // backend and trips the breaker along the way.
    let first = client.get(format!("http://{}", addr)).send().await.expect("proxy unreachable");
    assert!(first.status().as_u16() >= 500);

    // Subsequent requests should fail fast with the breaker open, before
    // ever dialing the backend again.
    let second = client.get(format!("http://{}", addr)).send().await.expect("proxy unreachable");
    assert_eq!(second.status(), 503, "breaker should now reject with Service Unavailable");

    shutdown.trigger();
}
