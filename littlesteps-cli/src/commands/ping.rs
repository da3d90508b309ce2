//! Store liveness check, same as `GET /health`

use anyhow::{Context, Result};
use clap::Parser;

use littlesteps_server::Connector;

/// Arguments for the ping command
#[derive(Parser, Debug)]
pub struct PingArgs {
    /// Document store connection URI (overrides OPERATIONAL_MONGO_URI)
    #[arg(long, env = "OPERATIONAL_MONGO_URI", hide_env_values = true)]
    pub mongo_uri: Option<String>,
}

/// Connect, ping once and close. Exits non-zero when the store is down.
pub async fn run_ping(args: PingArgs) -> Result<()> {
    let mut config = super::load_config()?;
    if let Some(uri) = args.mongo_uri {
        config.storage.uri = uri;
    }

    let connector = Connector::connect(&config.storage)
        .await
        .with_context(|| format!("Cannot reach {}", config.storage.redacted_uri()))?;
    let result = connector.ping().await;
    connector.shutdown().await;
    result.context("Store did not answer ping")?;

    println!(
        "storage up ({}, {})",
        connector.backend_name(),
        config.storage.redacted_uri()
    );
    Ok(())
}
