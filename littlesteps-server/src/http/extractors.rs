//! Custom Axum extractors
//!
//! Axum's own rejections are plain text; these map them onto the error
//! envelope so malformed input is always a `ValidationError`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::request::Parts;
use axum::Json;
use once_cell::sync::Lazy;
use regex::Regex;

use super::error::ApiError;
use super::server::AppState;
use crate::handlers::ResourceHandler;
use crate::models::ValidationError;

/// Resource type segment: lowercase slug, up to 64 characters
static RESOURCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_-]{0,63}$").expect("invalid resource regex"));

async fn path_params(
    parts: &mut Parts,
    state: &Arc<AppState>,
) -> Result<HashMap<String, String>, ApiError> {
    let Path(params): Path<HashMap<String, String>> = Path::from_request_parts(parts, state)
        .await
        .map_err(|_| {
            ApiError::Validation(ValidationError::InvalidFormat {
                field: "path".into(),
                reason: "malformed path parameters",
            })
        })?;
    Ok(params)
}

fn lookup(state: &AppState, params: &HashMap<String, String>) -> Result<ResourceHandler, ApiError> {
    let name = params.get("resource").map(String::as_str).unwrap_or_default();
    if !RESOURCE_RE.is_match(name) {
        return Err(ApiError::not_found("resource type", name));
    }
    state
        .resources
        .get(name)
        .cloned()
        .ok_or_else(|| ApiError::not_found("resource type", name))
}

/// Handler for the `{resource}` path segment
pub struct Collection(pub ResourceHandler);

impl FromRequestParts<Arc<AppState>> for Collection {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let params = path_params(parts, state).await?;
        Ok(Self(lookup(state, &params)?))
    }
}

/// Handler plus the `{id}` segment, and the `{link}` segment when routed
pub struct Member {
    pub handler: ResourceHandler,
    pub id: String,
    pub link: Option<String>,
}

impl FromRequestParts<Arc<AppState>> for Member {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let mut params = path_params(parts, state).await?;
        let handler = lookup(state, &params)?;
        let id = params.remove("id").ok_or_else(|| {
            ApiError::Validation(ValidationError::InvalidId {
                value: String::new(),
            })
        })?;
        Ok(Self {
            handler,
            id,
            link: params.remove("link"),
        })
    }
}

/// Query string as field -> expected value
pub struct Filters(pub BTreeMap<String, String>);

impl<S> FromRequestParts<S> for Filters
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(params) = Query::<BTreeMap<String, String>>::from_request_parts(parts, state)
            .await
            .map_err(|_| {
                ApiError::Validation(ValidationError::InvalidFormat {
                    field: "query".into(),
                    reason: "malformed query string",
                })
            })?;
        Ok(Self(params))
    }
}

/// JSON request body of any shape; the mapper checks it against the schema
pub struct JsonBody(pub serde_json::Value);

impl<S> FromRequest<S> for JsonBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<serde_json::Value>::from_request(req, state)
            .await
            .map_err(|e: JsonRejection| {
                ApiError::Validation(ValidationError::InvalidBody {
                    reason: e.body_text(),
                })
            })?;
        Ok(Self(value))
    }
}
