//! `/documents` admin handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::types::{AppError, Chunk, DocumentSummary, Result};
use crate::AppState;

/// Query parameters accepted by `GET /api/documents`.
#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
    /// Restrict to one party's documents.
    pub party: Option<String>,
}

/// `GET /api/documents` — list ingested documents, optionally filtered by party.
#[utoipa::path(
    get,
    path = "/api/documents",
    responses((status = 200, description = "Ingested documents", body = [DocumentSummary])),
    tag = "documents"
)]
pub async fn list_documents(
    State(state): State<AppState>,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<Json<Vec<DocumentSummary>>> {
    let documents = state.documents.list(query.party.as_deref());
    let mut summaries = Vec::with_capacity(documents.len());
    for document in documents {
        let filter = ("document_id".to_string(), document.id.clone());
        let chunk_count = state
            .vector_store
            .count_chunks(&state.collection, Some(&filter))
            .await
            .unwrap_or(0);
        summaries.push(DocumentSummary {
            id: document.id,
            party_id: document.party_id,
            source_url: document.source_url,
            chunk_count,
            page_count: document.page_count,
            downloaded_at: document.downloaded_at,
        });
    }
    Ok(Json(summaries))
}

/// Query parameters accepted by `GET /api/documents/{id}/chunks`.
#[derive(Debug, Deserialize)]
pub struct ListChunksQuery {
    /// Zero-based offset into the document's chunk sequence.
    #[serde(default)]
    pub offset: usize,
    /// Maximum chunks to return; capped at 100 per page.
    pub limit: Option<usize>,
}

const MAX_CHUNKS_PAGE: usize = 100;

/// `GET /api/documents/{id}/chunks` — paginated chunk inspection (admin).
#[utoipa::path(
    get,
    path = "/api/documents/{id}/chunks",
    responses(
        (status = 200, description = "Page of chunks", body = [Chunk]),
        (status = 404, description = "Unknown document"),
    ),
    tag = "documents"
)]
pub async fn list_document_chunks(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ListChunksQuery>,
) -> Result<Json<Vec<Chunk>>> {
    if state.documents.get(&id).is_none() {
        return Err(AppError::NotFound(format!("document '{id}' not found")));
    }
    let limit = query.limit.unwrap_or(MAX_CHUNKS_PAGE).min(MAX_CHUNKS_PAGE);
    let chunks = state
        .vector_store
        .list_chunks_by_document(&state.collection, &id, query.offset, limit)
        .await?;
    Ok(Json(chunks))
}
