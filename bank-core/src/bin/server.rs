//! Bank engine server binary

use bank_core::{Config, LedgerEngine};
use std::error::Error;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting EFHC Bank Server");

    // Load configuration
    let config = Config::from_env()?;

    // Open the ledger engine
    let engine = LedgerEngine::open(config).await?;
    engine.refresh_metrics()?;
    tracing::info!("Ledger engine opened successfully");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down bank server");
    Ok(())
}
