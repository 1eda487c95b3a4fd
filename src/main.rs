//! `entente` - negotiation server for AI-driven Diplomacy powers
//!
//! Exposes a single `POST /negotiate` endpoint that runs a multi-round
//! negotiation among the requested powers against a chat-completions
//! model and returns the agreed statements.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use entente_core::ServerConfig;

mod server;

#[derive(Parser, Debug)]
#[command(name = "entente", version, about = "Negotiation server for AI-driven Diplomacy powers")]
struct Cli {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1:8419")]
    bind: String,

    /// Chat-completions base URL
    #[arg(long, default_value = entente_core::config::DEFAULT_BASE_URL)]
    base_url: String,

    /// Model used when a request does not name one
    #[arg(long, default_value = entente_core::config::DEFAULT_MODEL)]
    model: String,

    /// Provider API key
    #[arg(long, env = "ENTENTE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Directory holding negotiation.tera (requests may override)
    #[arg(long)]
    prompts_dir: Option<PathBuf>,

    /// Per-call LLM timeout in seconds
    #[arg(long, default_value_t = 120)]
    request_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = ServerConfig {
        base_url: cli.base_url,
        default_model: cli.model,
        api_key: cli.api_key,
        prompts_dir: cli.prompts_dir,
        request_timeout: Duration::from_secs(cli.request_timeout),
    };

    let readiness = config.readiness();
    for warning in &readiness.warnings {
        warn!("readiness: {warning}");
    }

    let listener = TcpListener::bind(&cli.bind)
        .await
        .with_context(|| format!("failed to bind {}", cli.bind))?;

    server::serve(config, listener).await
}
