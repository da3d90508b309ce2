//! littlesteps-db - data-access service for the LittleSteps operational store
//!
//! Subcommands:
//! - `serve`: run the HTTP API over the document store
//! - `ping`: check that the document store answers

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod tracing_setup;

use tracing_setup::TracingConfig;

#[derive(Parser, Debug)]
#[command(
    name = "littlesteps-db",
    author,
    version,
    about = "HTTP data-access service for the LittleSteps operational document store",
    long_about = "Validates requests against per-resource schemas and performs create, read, \
                  update, delete and list operations on children, staff and activity records."
)]
struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP API server
    Serve(commands::serve::ServeArgs),
    /// Check document store connectivity and exit
    Ping(commands::ping::PingArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine; the process environment still applies
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    tracing_setup::init(&TracingConfig { debug: cli.debug })?;

    match cli.command {
        Commands::Serve(args) => commands::run_serve(args).await?,
        Commands::Ping(args) => commands::run_ping(args).await?,
    }

    Ok(())
}
