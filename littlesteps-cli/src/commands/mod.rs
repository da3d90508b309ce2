//! Command implementations for the littlesteps-db CLI

pub mod ping;
pub mod serve;

pub use ping::run_ping;
pub use serve::run_serve;

use anyhow::{Context, Result};
use littlesteps_server::ServiceConfig;

/// Load service configuration from the environment (after `.env`).
fn load_config() -> Result<ServiceConfig> {
    ServiceConfig::from_env().context("Invalid service configuration")
}
