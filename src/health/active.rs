//! Active health checking: a background task periodically probes every
//! known backend's health path and feeds the result into the same
//! hysteresis counters passive checking uses.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::schema::HealthCheckConfig;
use crate::http1;
use crate::load_balancer::pool::BackendRegistry;

/// Runs the periodic probe loop until the process exits or the task is
/// aborted. Intended to be spawned once at startup.
pub struct HealthMonitor {
    registry: Arc<BackendRegistry>,
}

impl HealthMonitor {
    pub fn new(registry: Arc<BackendRegistry>) -> Self {
        Self { registry }
    }

    /// Probe every registered backend once per `config.interval_secs`,
    /// forever. `config` is re-read from the caller each tick so a config
    /// reload changes the active check behavior without a restart.
    pub async fn run(&self, config_snapshot: impl Fn() -> HealthCheckConfig) {
        loop {
            let config = config_snapshot();
            if !config.enabled {
                tokio::time::sleep(Duration::from_secs(config.interval_secs.max(1))).await;
                continue;
            }

            for backend in self.registry.all() {
                let config = config.clone();
                tokio::spawn(async move {
                    let healthy = probe_once(&backend.host, backend.port, &config).await;
                    if healthy {
                        backend.mark_success(config.success_threshold);
                    } else {
                        backend.mark_failure(config.failure_threshold);
                    }
                });
            }

            tokio::time::sleep(Duration::from_secs(config.interval_secs.max(1))).await;
        }
    }
}

/// Open a connection, send a HEAD probe, and check the response status
/// falls within the configured acceptable range. Any I/O error, parse
/// failure, or timeout counts as a failed probe.
async fn probe_once(host: &str, port: u16, config: &HealthCheckConfig) -> bool {
    let timeout = Duration::from_secs(config.timeout_secs.max(1));
    match tokio::time::timeout(timeout, probe_inner(host, port, &config.path)).await {
        Ok(Ok(status)) => status >= config.expected_status_min && status <= config.expected_status_max,
        _ => false,
    }
}

async fn probe_inner(host: &str, port: u16, path: &str) -> std::io::Result<u16> {
    let mut stream = TcpStream::connect((host, port)).await?;
    let request = format!("HEAD {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;
    stream.flush().await?;

    let mut buf = Vec::with_capacity(512);
    let mut chunk = [0u8; 512];
    loop {
        if http1::find_header_end(&buf).is_some() {
            break;
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let head = http1::parse_response_head(&buf)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
    Ok(head.status)
}
