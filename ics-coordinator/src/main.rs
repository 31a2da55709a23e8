//! ics-coordinator - Information Coordinator Service
//!
//! Brokers information jobs between consumers and the producers able to
//! serve them. Default port: 8083.

use anyhow::{Context, Result};
use clap::Parser;
use ics_common::config::{resolve_config_path, resolve_vardata_directory, TomlConfig};
use ics_coordinator::clients::{HttpRestClient, RestClient};
use ics_coordinator::service::CoordinatorSettings;
use ics_coordinator::{AppState, InfoCoordinator};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "ics-coordinator", version, about = "Information coordinator service")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root directory of the persisted registry
    #[arg(long)]
    vardata: Option<PathBuf>,

    /// HTTP listen port (overrides the config file)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let config = TomlConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    ics_common::logging::init(&config.logging.level);

    info!(
        "Starting ics-coordinator v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    if let Some(path) = &config_path {
        info!(path = %path.display(), "Configuration file");
    }

    let vardata = resolve_vardata_directory(args.vardata.as_deref(), &config);
    info!(vardata = %vardata.display(), "Vardata directory");

    // Only job status reports to job owners go through the proxy
    let rest_client: Arc<dyn RestClient> = Arc::new(
        HttpRestClient::new(&config.callbacks, None).context("Failed to create REST client")?,
    );
    let proxy_client: Arc<dyn RestClient> = Arc::new(
        HttpRestClient::new(&config.callbacks, Some(&config.http_proxy))
            .context("Failed to create proxied REST client")?,
    );

    let coordinator = Arc::new(
        InfoCoordinator::new(
            &vardata,
            rest_client,
            proxy_client,
            CoordinatorSettings::from(&config),
        )
        .context("Failed to open registry store")?,
    );
    coordinator
        .restore_from_disk()
        .context("Failed to restore registry from disk")?;

    let shutdown = CancellationToken::new();
    let supervision = Arc::new(coordinator.supervision()).spawn(config.supervision.interval(), shutdown.clone());

    let app = ics_coordinator::build_router(AppState::new(coordinator));

    let port = args.port.unwrap_or(config.port);
    let address = format!("{}:{}", config.bind_address, port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Listening on http://{}", address);

    let signal_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown requested");
            signal_token.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Err(e) = supervision.await {
        tracing::error!(error = %e, "Producer supervision task failed");
    }
    info!("ics-coordinator stopped");
    Ok(())
}
