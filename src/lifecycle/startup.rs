//! Startup orchestration.
//!
//! Loads and validates configuration, binds the listener (and TLS acceptor,
//! if configured), wires the config watcher and signal handler into a single
//! reload stream, and hands everything to [`crate::http::server::HttpServer`].
//! Subsystems come up in dependency order; traffic is only accepted once
//! everything else is ready.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ProxyConfig;
use crate::config::watcher::ConfigWatcher;
use crate::http::server::{AppState, HttpServer};
use crate::lifecycle::shutdown::Shutdown;
use crate::net::listener::Listener;
use crate::net::tls::load_tls_acceptor;
use crate::observability::metrics;

/// Run the proxy to completion. Returns once `shutdown` fires and the
/// accept loop has stopped.
pub async fn run(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&config_path)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        "configuration loaded"
    );

    let tls_acceptor = match &config.listener.tls {
        Some(tls) => {
            let acceptor = load_tls_acceptor(
                std::path::Path::new(&tls.cert_path),
                std::path::Path::new(&tls.key_path),
            )
            .await?;
            Some(acceptor)
        }
        None => None,
    };

    let listener = Listener::bind(&config.listener).await?;
    let metrics_handle = metrics::install_recorder();
    let state = AppState::new(config, config_path.clone(), metrics_handle);

    let shutdown = Arc::new(Shutdown::new());

    let (merged_tx, merged_rx) = mpsc::unbounded_channel::<ProxyConfig>();

    let (watcher, mut watcher_rx) = ConfigWatcher::new(&config_path);
    let _watcher_handle = watcher.run()?;
    let forward_tx = merged_tx.clone();
    let mut forward_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(cfg) = watcher_rx.recv() => {
                    if forward_tx.send(cfg).is_err() {
                        break;
                    }
                }
                _ = forward_shutdown.recv() => break,
                else => break,
            }
        }
    });

    tokio::spawn(signals_task(shutdown.clone(), config_path, merged_tx));

    let server = HttpServer::new(state);
    server.run(listener, tls_acceptor, merged_rx, shutdown.subscribe()).await?;

    Ok(())
}

async fn signals_task(shutdown: Arc<Shutdown>, config_path: PathBuf, reload_tx: mpsc::UnboundedSender<ProxyConfig>) {
    crate::lifecycle::signals::listen(shutdown, config_path, reload_tx).await;
}
