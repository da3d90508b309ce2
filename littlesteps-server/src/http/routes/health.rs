//! Health check endpoint

use std::sync::Arc;

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::http::envelope::Envelope;
use crate::http::error::ApiError;
use crate::http::server::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub storage: &'static str,
    pub version: &'static str,
}

/// GET /health - pings the store within the request timeout
async fn health(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Envelope<HealthResponse>>, ApiError> {
    state.connector.ping().await?;
    Ok(Envelope::success(HealthResponse {
        status: "ok",
        storage: "up",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// Health routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}
