//! Handlers for evidence documents and search.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/api/documents` | Own and shared documents |
//! | `POST`   | `/api/documents` | Body: [`NewDocumentBody`]; text is chunked, returns 201 |
//! | `GET`    | `/api/documents/{id}` | Document with its chunks |
//! | `DELETE` | `/api/documents/{id}` | Owner only; 204 |
//! | `GET`    | `/api/wiki-search` | `?q=<query>[&limit=n]` |

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use eris_core::search::SearchResults;
use eris_core::session::{Document, DocumentChunk};
use eris_core::store::DebateStore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, auth::AuthUser, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct NewDocumentBody {
    pub title: String,
    pub source: Option<String>,
    pub text: String,
    /// Visible to every user when set.
    #[serde(default)]
    pub shared: bool,
}

/// `POST /api/documents`
pub async fn create<S>(
    State(state): State<AppState<S>>,
    user: AuthUser,
    Json(body): Json<NewDocumentBody>,
) -> Result<impl IntoResponse, ApiError>
where
    S: DebateStore + Clone + 'static,
{
    let new_document = state.services.search.prepare_document(
        user.id(),
        &body.title,
        body.source,
        body.shared,
        &body.text,
    )?;
    let document = state
        .store
        .add_document(new_document)
        .await
        .map_err(ApiError::store)?;

    tracing::info!(document_id = %document.id, chunks = document.chunk_count, "document added");
    Ok((StatusCode::CREATED, Json(document)))
}

/// `GET /api/documents`
pub async fn list<S>(
    State(state): State<AppState<S>>,
    user: AuthUser,
) -> Result<Json<Vec<Document>>, ApiError>
where
    S: DebateStore + Clone + 'static,
{
    let documents = state
        .store
        .list_documents(user.id())
        .await
        .map_err(ApiError::store)?;
    Ok(Json(documents))
}

#[derive(Debug, Serialize)]
pub struct DocumentView {
    pub document: Document,
    pub chunks: Vec<DocumentChunk>,
}

/// `GET /api/documents/{id}`
pub async fn get_one<S>(
    State(state): State<AppState<S>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentView>, ApiError>
where
    S: DebateStore + Clone + 'static,
{
    let document = state
        .store
        .get_document(user.id(), id)
        .await
        .map_err(ApiError::store)?
        .ok_or_else(|| ApiError::NotFound(format!("document {id} not found")))?;
    let chunks = state
        .store
        .document_chunks(user.id(), id)
        .await
        .map_err(ApiError::store)?;
    Ok(Json(DocumentView { document, chunks }))
}

/// `DELETE /api/documents/{id}`
pub async fn delete_one<S>(
    State(state): State<AppState<S>>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
    S: DebateStore + Clone + 'static,
{
    let deleted = state
        .store
        .delete_document(user.id(), id)
        .await
        .map_err(ApiError::store)?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("document {id} not found")))
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
}

/// `GET /api/wiki-search?q=...`
pub async fn search<S>(
    State(state): State<AppState<S>>,
    user: AuthUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResults>, ApiError>
where
    S: DebateStore + Clone + 'static,
{
    let results = state
        .services
        .search
        .search(state.store.as_ref(), user.id(), &params.q, params.limit)
        .await?;
    Ok(Json(results))
}
