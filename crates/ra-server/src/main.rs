//! Room automation daemon
//!
//! Usage: `room-automation [rooms.yaml]`

use anyhow::Result;
use ra_server::RoomAutomation;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_CONFIG: &str = "rooms.yaml";

#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let config = ra_config::load_config(&path)?;

    // RUST_LOG wins over the configured level
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!(config = %path.display(), "Starting room automation");

    let app = RoomAutomation::start(&config)?;

    info!(rooms = app.rooms().len(), "Room automation is running");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    app.shutdown().await;

    Ok(())
}
