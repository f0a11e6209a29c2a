//! Load testing for the reverse proxy.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reverse_proxy::config::{PathRoute, ProxyConfig};
use reverse_proxy::http::server::{AppState, HttpServer};
use reverse_proxy::lifecycle::Shutdown;
use reverse_proxy::net::listener::Listener;

mod common;

#[tokio::test]
async fn test_load_performance() {
    let backend_addr: SocketAddr = "127.0.0.1:28481".parse().unwrap();
    common::start_mock_backend(backend_addr, "Hello from backend").await;

    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.path_routes.push(PathRoute {
        prefix: "/".to_string(),
        backends: vec![format!("http://{}", backend_addr)],
    });
    config.health_check.enabled = false;
    config.circuit_breaker.enabled = false;

    let listener = Listener::bind(&config.listener).await.expect("bind listener");
    let proxy_addr = listener.local_addr().unwrap();

    let metrics = common::shared_metrics_handle();
    let state = AppState::new(config, PathBuf::from("unused.json"), metrics);
    let shutdown = Arc::new(Shutdown::new());

    let (_tx, config_updates) = tokio::sync::mpsc::unbounded_channel();
    let server = HttpServer::new(state);
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, None, config_updates, server_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(300)).await;

    let concurrency = 20;
    let requests_per_task = 50;
    let total_requests = concurrency * requests_per_task;

    let client = reqwest::Client::new();
    let start = Instant::now();

    let mut tasks = Vec::new();
    for _ in 0..concurrency {
        let client = client.clone();
        let url = format!("http://{}", proxy_addr);
        tasks.push(tokio::spawn(async move {
            let mut latencies = Vec::new();
            for _ in 0..requests_per_task {
                let req_start = Instant::now();
                if let Ok(res) = client.get(&url).send().await {
                    if res.status().is_success() {
                        latencies.push(req_start.elapsed());
                    }
                }
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for task in tasks {
        let latencies = task.await.unwrap();
        all_latencies.extend(latencies);
    }

    let duration = start.elapsed();
    let rps = total_requests as f64 / duration.as_secs_f64();

    if all_latencies.is_empty() {
        panic!("no successful requests recorded");
    }

    all_latencies.sort();
    let p50 = all_latencies[all_latencies.len() / 2];
    let p95 = all_latencies[(all_latencies.len() as f64 * 0.95) as usize];
    let p99 = all_latencies[(all_latencies.len() as f64 * 0.99) as usize];

    println!("\n--- Load Test Results ---");
    println!("Total Requests: {}", total_requests);
    println!("Concurrency:    {}", concurrency);
    println!("Total Duration: {:?}", duration);
    println!("Requests/sec:   {:.2}", rps);
    println!("P50 Latency:    {:?}", p50);
    println!("P95 Latency:    {:?}", p95);
    println!("P99 Latency:    {:?}", p99);
    println!("Success Rate:   {}/{}", all_latencies.len(), total_requests);
    println!("-------------------------\n");

    assert!(all_latencies.len() as f64 / total_requests as f64 > 0.95, "success rate should stay above 95% under load");

    shutdown.trigger();
}
