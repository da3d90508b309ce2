//! HTTP server command
//!
//! Connects to the document store, then serves every resource route until
//! Ctrl+C or SIGTERM.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;

use littlesteps_server::config::BackendKind;
use littlesteps_server::{run_server, Connector};

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind to (default: 0.0.0.0:5001)
    #[arg(long, short = 'b', env = "BIND_ADDR")]
    pub bind: Option<SocketAddr>,

    /// Allow permissive CORS (all origins) - use with caution
    #[arg(long)]
    pub cors_permissive: bool,

    /// Document store connection URI (overrides OPERATIONAL_MONGO_URI)
    #[arg(long, env = "OPERATIONAL_MONGO_URI", hide_env_values = true)]
    pub mongo_uri: Option<String>,

    /// Database name (default: the one named in the connection URI)
    #[arg(long, env = "OPERATIONAL_DB_NAME")]
    pub db_name: Option<String>,

    /// Use the in-memory store instead of MongoDB (data is lost on exit)
    #[arg(long)]
    pub memory: bool,
}

/// Run the HTTP server
pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut config = super::load_config()?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    config.cors_permissive |= args.cors_permissive;
    if let Some(uri) = args.mongo_uri {
        config.storage.uri = uri;
    }
    if args.db_name.is_some() {
        config.storage.database = args.db_name;
    }
    if args.memory {
        config.storage.backend = BackendKind::Memory;
    }

    tracing::info!(
        uri = %config.storage.redacted_uri(),
        timeout = ?config.storage.timeout,
        "Connecting to document store"
    );
    let connector = Connector::connect(&config.storage)
        .await
        .context("Failed to connect to the document store")?;

    tracing::info!("Starting littlesteps-db server on {}", config.bind_addr);
    run_server(connector, &config)
        .await
        .context("Server error")?;

    Ok(())
}
