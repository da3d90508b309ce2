//! Axum server setup
//!
//! Server skeleton with:
//! - Localhost-only CORS by default
//! - Tracing middleware
//! - Panics answered with a 500 envelope
//! - Graceful shutdown on SIGTERM/Ctrl+C, then the store client is closed

use std::any::Any;
use std::sync::Arc;

use axum::http::{HeaderValue, Method, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as CorsAny, CorsLayer};
use tower_http::trace::TraceLayer;

use super::error::ApiError;
use super::routes;
use crate::config::{ServiceConfig, ValidationConfig};
use crate::handlers::Resources;
use crate::models::SchemaRegistry;
use crate::storage::Connector;

/// Origins allowed when CORS is not permissive
const LOCAL_ORIGINS: [&str; 4] = [
    "http://localhost:3000",
    "http://localhost:5001",
    "http://127.0.0.1:3000",
    "http://127.0.0.1:5001",
];

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub connector: Connector,
    pub resources: Resources,
}

impl AppState {
    /// Built-in resource types with validation modes from configuration.
    pub fn new(connector: Connector, validation: &ValidationConfig) -> Self {
        let registry = SchemaRegistry::builtin()
            .with_modes(validation.default_mode, &validation.overrides);
        let resources = Resources::new(&registry, &connector, validation.null_policy);
        Self {
            connector,
            resources,
        }
    }

    /// Built-in resource types with their declared modes.
    pub fn builtin(connector: Connector) -> Self {
        Self::new(connector, &ValidationConfig::default())
    }
}

/// Build the application router.
pub fn build_router(state: AppState, cors_permissive: bool) -> Router {
    let cors = if cors_permissive {
        tracing::warn!("CORS: Permissive mode enabled - all origins allowed");
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(LOCAL_ORIGINS.map(HeaderValue::from_static))
            .allow_methods(CorsAny)
            .allow_headers(CorsAny)
    };

    Router::new()
        .merge(routes::health::router())
        .merge(routes::resources::router())
        .fallback(route_not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

async fn route_not_found(uri: Uri) -> ApiError {
    ApiError::not_found("route", uri.path())
}

/// A known path with an unrouted method is reported like an unknown route.
async fn method_not_allowed(method: Method, uri: Uri) -> ApiError {
    ApiError::not_found("route", format!("{} {}", method, uri.path()))
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    let (error, correlation_id) = ApiError::internal();
    tracing::error!(%correlation_id, panic = detail, "request handler panicked");
    error.into_response()
}

/// Run the HTTP server until a shutdown signal, then close the connector.
pub async fn run_server(connector: Connector, config: &ServiceConfig) -> Result<(), ServerError> {
    let state = AppState::new(connector.clone(), &config.validation);
    tracing::info!(
        resources = ?state.resources.names().collect::<Vec<_>>(),
        backend = connector.backend_name(),
        timeout = ?connector.timeout(),
        "resources registered"
    );
    let app = build_router(state, config.cors_permissive);

    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    connector.shutdown().await;
    served?;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}

/// Server error type
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
