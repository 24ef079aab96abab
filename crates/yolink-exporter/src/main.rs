//! YoLink exporter daemon.
//!
//! Fetches sensor data from the YoLink API on demand and exposes Prometheus
//! metrics for temperature, humidity, battery level, and device status.

use anyhow::{bail, Context, Result};
use clap::Parser;
use prometheus::Registry;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use yolink_exporter::cli::Cli;
use yolink_exporter::client::YoLinkClient;
use yolink_exporter::config::{self, Config};
use yolink_exporter::exporter::YoLinkExporter;
use yolink_exporter::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_CONFIG_PATH));
    let config = Config::load(&config_path)?;

    // Priority: CLI flag > environment variable > config file
    let api_key = config::resolve_credential(cli.api_key, config::API_KEY_ENV, &config.api.key);
    let secret = config::resolve_credential(cli.secret, config::API_SECRET_ENV, &config.api.secret);
    if api_key.is_empty() || secret.is_empty() {
        bail!(
            "API key and secret are required. Use --api-key and --secret flags, \
             or set YOLINK_API_KEY and YOLINK_SECRET environment variables"
        );
    }

    let client = YoLinkClient::new(api_key, secret, config.api.endpoint.clone())
        .context("failed to create YoLink client")?;
    let exporter = YoLinkExporter::new(client, config.scrape_interval());

    let registry = Registry::new();
    registry
        .register(Box::new(exporter))
        .context("failed to register exporter")?;

    info!(
        "Starting YoLink exporter v{} on {}",
        env!("CARGO_PKG_VERSION"),
        config.bind_address()
    );
    server::run(AppState { registry }, &config.bind_address()).await
}
