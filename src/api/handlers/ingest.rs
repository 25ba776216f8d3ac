//! `/ingest` admin handlers.

use axum::extract::State;
use axum::Json;

use crate::rag::ingest::IngestOptions;
use crate::types::{AppError, IngestBatchRequest, IngestBatchResponse, IngestRequest, IngestResult, Result};
use crate::AppState;

fn validate(request: &IngestRequest) -> Result<()> {
    if request.url.trim().is_empty() {
        return Err(AppError::InvalidInput("url must not be empty".into()));
    }
    if request.doc_id.trim().is_empty() {
        return Err(AppError::InvalidInput("doc_id must not be empty".into()));
    }
    if request.party_id.trim().is_empty() {
        return Err(AppError::InvalidInput("party_id must not be empty".into()));
    }
    Ok(())
}

/// `POST /api/ingest` — ingest one document by URL (admin).
#[utoipa::path(
    post,
    path = "/api/ingest",
    request_body = IngestRequest,
    responses((status = 200, description = "Ingestion outcome", body = IngestResult)),
    tag = "ingest"
)]
pub async fn ingest(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResult>> {
    validate(&request)?;
    if !state.parties.read().contains(&request.party_id) {
        return Err(AppError::InvalidInput(format!(
            "unknown party '{}'",
            request.party_id
        )));
    }

    let options = IngestOptions {
        collection: state.collection.clone(),
    };
    let result = state.ingestion.ingest(&request, &options).await;
    Ok(Json(result))
}

/// `POST /api/ingest/batch` — ingest several documents sequentially (admin).
#[utoipa::path(
    post,
    path = "/api/ingest/batch",
    request_body = IngestBatchRequest,
    responses((status = 200, description = "Per-document outcomes", body = IngestBatchResponse)),
    tag = "ingest"
)]
pub async fn ingest_batch(
    State(state): State<AppState>,
    Json(request): Json<IngestBatchRequest>,
) -> Result<Json<IngestBatchResponse>> {
    for doc in &request.documents {
        validate(doc)?;
        if !state.parties.read().contains(&doc.party_id) {
            return Err(AppError::InvalidInput(format!("unknown party '{}'", doc.party_id)));
        }
    }

    let options = IngestOptions {
        collection: state.collection.clone(),
    };
    let results = state.ingestion.ingest_batch(&request.documents, &options).await;
    Ok(Json(IngestBatchResponse { results }))
}
