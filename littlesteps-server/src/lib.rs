//! littlesteps-server: data-access service for the operational store
//!
//! Mediates HTTP clients and a document store holding children, staff and
//! activity records. Requests are validated against per-resource schemas
//! before any store call, and every response uses the same JSON envelope.

pub mod config;
pub mod handlers;
pub mod http;
pub mod models;
pub mod storage;

pub use config::{ConfigError, ServiceConfig, StorageConfig};
pub use http::{build_router, run_server, ApiError, AppState};
pub use storage::{Connector, StorageError};
