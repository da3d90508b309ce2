//! Resource endpoints
//!
//! One set of routes serves every registered resource type; the extractors
//! resolve `{resource}` to its handler or answer 404.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};

use crate::http::envelope::Envelope;
use crate::http::error::ApiError;
use crate::http::extractors::{Collection, Filters, JsonBody, Member};
use crate::http::server::AppState;
use crate::models::Document;

type DocumentResponse = Json<Envelope<Document>>;

/// GET /{resource} - documents matching the query filters
async fn list_documents(
    Collection(handler): Collection,
    Filters(filters): Filters,
) -> Result<Json<Envelope<Vec<Document>>>, ApiError> {
    let docs = handler.list(&filters).await?;
    Ok(Envelope::success(docs))
}

/// POST /{resource} - create a document
async fn create_document(
    Collection(handler): Collection,
    JsonBody(body): JsonBody,
) -> Result<(StatusCode, DocumentResponse), ApiError> {
    let doc = handler.create(body).await?;
    Ok((StatusCode::CREATED, Envelope::success(doc)))
}

/// GET /{resource}/{id}
async fn get_document(member: Member) -> Result<DocumentResponse, ApiError> {
    let doc = member.handler.get(&member.id).await?;
    Ok(Envelope::success(doc))
}

/// PUT|PATCH /{resource}/{id} - partial update
async fn update_document(
    member: Member,
    JsonBody(body): JsonBody,
) -> Result<DocumentResponse, ApiError> {
    let doc = member.handler.update(&member.id, body).await?;
    Ok(Envelope::success(doc))
}

/// DELETE /{resource}/{id}
async fn delete_document(member: Member) -> Result<StatusCode, ApiError> {
    member.handler.delete(&member.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /{resource}/{id}/{link} - add an identifier to a linked array
async fn link_document(
    member: Member,
    JsonBody(body): JsonBody,
) -> Result<DocumentResponse, ApiError> {
    let link = member.link.unwrap_or_default();
    let doc = member.handler.link(&member.id, &link, body).await?;
    Ok(Envelope::success(doc))
}

/// Resource routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/{resource}", get(list_documents).post(create_document))
        .route(
            "/{resource}/{id}",
            get(get_document)
                .put(update_document)
                .patch(update_document)
                .delete(delete_document),
        )
        .route("/{resource}/{id}/{link}", put(link_document))
}
