use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for the reverse proxy admin API", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Bearer token for the admin API. Omit if the proxy relies on IP
    /// whitelisting or basic auth instead.
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate process health: status, uptime, version
    Health,
    /// Prometheus text exposition
    Metrics,
    /// Backend count, rate limiter load, rejection totals
    Stats,
    /// Configured path and domain routes
    Routes,
    /// Force a configuration reload from disk
    ReloadRoutes,
    /// Circuit breaker state per backend
    Circuits,
    /// Reset a backend's circuit breaker (or all, if none given)
    ResetCircuits {
        /// Backend URL to reset; omits to reset every breaker
        backend: Option<String>,
    },
    /// Rate limiter state
    Ratelimit,
    /// Clear all rate limiter buckets
    ResetRatelimit,
    /// Backend health snapshot (active + passive)
    Backends,
    /// Enabled proxy features
    Config,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", key))?);
    }

    let (method, path, query): (&str, &str, Option<String>) = match &cli.command {
        Commands::Health => ("GET", "/admin/health", None),
        Commands::Metrics => ("GET", "/admin/metrics", None),
        Commands::Stats => ("GET", "/admin/stats", None),
        Commands::Routes => ("GET", "/admin/routes", None),
        Commands::ReloadRoutes => ("POST", "/admin/routes/reload", None),
        Commands::Circuits => ("GET", "/admin/circuits", None),
        Commands::ResetCircuits { backend } => {
            ("POST", "/admin/circuits/reset", backend.as_ref().map(|b| format!("backend={}", b)))
        }
        Commands::Ratelimit => ("GET", "/admin/ratelimit", None),
        Commands::ResetRatelimit => ("POST", "/admin/ratelimit/reset", None),
        Commands::Backends => ("GET", "/admin/backends", None),
        Commands::Config => ("GET", "/admin/config", None),
    };

    let mut target = format!("{}{}", cli.url, path);
    if let Some(q) = query {
        target.push('?');
        target.push_str(&q);
    }

    let request = match method {
        "POST" => client.post(target),
        _ => client.get(target),
    };
    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let content_type = res
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if !status.is_success() {
        eprintln!("admin API returned {}", status);
    }

    if content_type.contains("application/json") {
        let json: Value = res.json().await?;
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        println!("{}", res.text().await?);
    }

    Ok(())
}
