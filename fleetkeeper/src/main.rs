use anyhow::{Context, Result};
use clap::Parser;
use fleetkeeper::config::LogFormat;
use fleetkeeper::{Monitor, MonitorConfig, MonitorSettings, RedisConnector};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "fleetkeeper")]
#[command(about = "Fleetkeeper - Redis fleet monitor", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yml")]
    config: PathBuf,
}

fn init_tracing(config: &MonitorConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_target(true)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = MonitorConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    init_tracing(&config);

    info!("Starting Fleetkeeper v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Loaded {} fleets from {}",
        config.fleets.len(),
        args.config.display()
    );
    if config.fleets.is_empty() {
        warn!("No fleets configured, nothing to monitor");
    }

    let settings = MonitorSettings::from(&config);
    let monitor = Monitor::new(
        config.fleets.clone(),
        Arc::new(RedisConnector::new()),
        config.notify.build(),
        settings,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(monitor.run(shutdown_rx));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown requested, stopping fleet monitors");
    let _ = shutdown_tx.send(true);

    let joined = handle.await.context("Monitor task panicked")?;
    info!("Fleetkeeper stopped ({} fleet tasks joined)", joined);
    Ok(())
}
