//! Nomad exporter
//!
//! Serves Prometheus metrics gathered from the Nomad HTTP API on each scrape.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use nomad_exporter::{api, Args, Config, NomadClient, NomadCollector};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_args(Args::parse())?;

    // Initialize tracing (prefer RUST_LOG, fallback to --log.level)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting nomad_exporter {}", env!("CARGO_PKG_VERSION"));
    info!(
        listen_addr = %config.listen_addr,
        metrics_path = %config.metrics_path,
        nomad_server = %config.nomad.address,
        timeout_secs = config.nomad.timeout.as_secs(),
        max_concurrency = config.nomad.max_concurrency,
        "Configuration loaded"
    );

    let client = NomadClient::new(&config.nomad)
        .await
        .context("Failed to create Nomad client")?;
    let collector = NomadCollector::new(Arc::new(client))
        .with_max_concurrency(config.nomad.max_concurrency);

    let app = api::create_router(Arc::new(collector), &config.metrics_path);

    let listener = tokio::net::TcpListener::bind(config.listen_addr.as_str())
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!(addr = %listener.local_addr()?, "Listening for connections");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received shutdown signal");
        })
        .await?;

    info!("Exporter shutdown complete");
    Ok(())
}
