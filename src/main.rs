//! Reverse proxy and static file server entry point.

use std::path::PathBuf;

use clap::Parser;
use reverse_proxy::config::loader::load_config;
use reverse_proxy::lifecycle::startup;
use reverse_proxy::observability::logging;

/// HTTP/1.1 reverse proxy and static file server.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Read once up front purely to pick a log level and JSON/pretty format
    // before any other subsystem starts logging; `startup::run` loads it
    // again afterward so hot-reload and validation stay in one place.
    let (log_level, json) = match load_config(&cli.config) {
        Ok(cfg) => (cfg.observability.log_level, std::env::var("LOG_FORMAT").as_deref() == Ok("json")),
        Err(_) => ("info".to_string(), false),
    };
    logging::init(&log_level, json);

    tracing::info!(config_path = %cli.config.display(), "reverse-proxy starting");

    if let Err(e) = startup::run(cli.config).await {
        tracing::error!(error = %e, "fatal startup error");
        std::process::exit(1);
    }

    tracing::info!("shutdown complete");
}
