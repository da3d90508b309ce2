//! API error types with IntoResponse
//!
//! Every failure becomes `{"status": "error", "code", "message"}` with one of
//! four codes. Store failures are logged with a correlation id and returned
//! with a generic message; the driver's text never reaches the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use crate::handlers::HandlerError;
use crate::models::ValidationError;
use crate::storage::StorageError;

/// API error type with automatic HTTP status mapping
#[derive(Debug)]
pub enum ApiError {
    /// Bad input (400)
    Validation(ValidationError),

    /// Document, resource type or route not found (404)
    NotFound { resource: String, id: String },

    /// Store unreachable, timed out or failing (503, logged)
    StorageUnavailable { correlation_id: Uuid },

    /// Anything else (500, logged)
    Internal { correlation_id: Uuid },
}

impl ApiError {
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Internal error with a fresh correlation id; the caller logs the cause.
    pub fn internal() -> (Self, Uuid) {
        let correlation_id = Uuid::new_v4();
        (Self::Internal { correlation_id }, correlation_id)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::StorageUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::NotFound { .. } => "NotFound",
            Self::StorageUnavailable { .. } => "StorageUnavailable",
            Self::Internal { .. } => "InternalError",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.code();
        let body = match &self {
            Self::Validation(e) => json!({
                "status": "error",
                "code": code,
                "message": e.to_string()
            }),
            Self::NotFound { resource, id } => json!({
                "status": "error",
                "code": code,
                "message": format!("{} '{}' not found", resource, id)
            }),
            Self::StorageUnavailable { correlation_id } => json!({
                "status": "error",
                "code": code,
                "message": "the document store is unavailable",
                "correlation_id": correlation_id
            }),
            Self::Internal { correlation_id } => json!({
                "status": "error",
                "code": code,
                "message": "an internal error occurred",
                "correlation_id": correlation_id
            }),
        };

        (self.status(), Json(body)).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        let correlation_id = Uuid::new_v4();
        match e {
            StorageError::Corrupt(_) => {
                tracing::error!(%correlation_id, error = %e, "stored data error");
                Self::Internal { correlation_id }
            }
            _ => {
                tracing::error!(%correlation_id, error = %e, "storage error");
                Self::StorageUnavailable { correlation_id }
            }
        }
    }
}

impl From<HandlerError> for ApiError {
    fn from(e: HandlerError) -> Self {
        match e {
            HandlerError::Validation(e) => Self::Validation(e),
            HandlerError::NotFound { resource, id } => Self::NotFound { resource, id },
            HandlerError::Storage(e) => e.into(),
        }
    }
}
