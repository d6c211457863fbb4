use std::sync::Arc;

use intake::config::Config;
use intake::intake::{EventIntake, LogEmitter};
use intake::server;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let handle = server::start(&cfg, Arc::new(EventIntake::new(LogEmitter)))?;
    tracing::info!(addr = %handle.local_addr(), "http input started");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    tokio::task::spawn_blocking(move || handle.shutdown()).await?;

    Ok(())
}
