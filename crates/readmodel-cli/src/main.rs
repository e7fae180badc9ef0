//! Read Model CLI - serves the read model as MCP tools over stdio

use anyhow::{bail, Context, Result};
use clap::Parser;
use readmodel::{AppConfig, Credentials, ReadModel};
use readmodel_mcp::McpServer;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "readmodel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Username for the feed's token exchange
    #[arg(long, env = "READMODEL_USERNAME")]
    username: Option<String>,

    /// Personal access token for the feed's token exchange
    #[arg(long, env = "READMODEL_PAT", hide_env_values = true)]
    pat: Option<String>,

    /// Base URL of the event feed
    #[arg(long, env = "READMODEL_FEED_URL")]
    feed_url: Option<String>,

    /// Token exchange endpoint
    #[arg(long, env = "READMODEL_AUTH_URL")]
    auth_url: Option<String>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Open this database file at startup
    #[arg(long)]
    store: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the protocol, so logs go to stderr
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let credentials = Credentials::new(cli.username, cli.pat);
    if credentials.is_empty() {
        bail!("either --username or --pat must be provided");
    }

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AppConfig::default(),
    };
    if let Some(url) = cli.feed_url {
        config.feed.base_url = url;
    }
    if let Some(url) = cli.auth_url {
        config.feed.auth_url = url;
    }

    let model = ReadModel::builder()
        .with_config(config)
        .with_credentials(credentials)
        .build()
        .context("failed to build read model")?;
    let model = Arc::new(model);

    if let Some(store) = &cli.store {
        let message = model
            .initialize_store(Some(store.as_path()))
            .await
            .with_context(|| format!("failed to open store {}", store.display()))?;
        tracing::info!("{}", message);
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Read model MCP server ready");

    let server = McpServer::new(model.clone());
    let served = server.run().await;

    model.shutdown().await;
    served.context("MCP server failed")?;
    Ok(())
}
