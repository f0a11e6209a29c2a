//! OS signal handling.
//!
//! SIGTERM and SIGINT both trigger graceful shutdown; SIGHUP reloads the
//! configuration file from disk, the same as the file watcher would, so an
//! operator can force a reload without touching the file's mtime.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ProxyConfig;
use crate::lifecycle::shutdown::Shutdown;

/// Listen for SIGTERM/SIGINT/SIGHUP until shutdown is triggered by some
/// other means. Runs until the process exits; spawn and forget.
pub async fn listen(shutdown: Arc<Shutdown>, config_path: PathBuf, reload_tx: mpsc::UnboundedSender<ProxyConfig>) {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to register SIGTERM handler");
            return;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to register SIGINT handler");
            return;
        }
    };
    let mut sighup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to register SIGHUP handler");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                shutdown.trigger();
                break;
            }
            _ = sigint.recv() => {
                tracing::info!("received SIGINT, shutting down");
                shutdown.trigger();
                break;
            }
            _ = sighup.recv() => {
                tracing::info!(path = ?config_path, "received SIGHUP, reloading configuration");
                match load_config(&config_path) {
                    Ok(config) => {
                        let _ = reload_tx.send(config);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "SIGHUP reload failed, keeping current configuration");
                    }
                }
            }
        }
    }
}
