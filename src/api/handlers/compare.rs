//! `/compare` handler.

use axum::extract::State;
use axum::Json;

use crate::types::{AppError, CompareRequest, CompareResponse, Result};
use crate::AppState;

fn validate(request: &CompareRequest) -> Result<()> {
    if request.topic.trim().is_empty() {
        return Err(AppError::InvalidInput("topic must not be empty".into()));
    }
    if let Some(top_k) = request.top_k {
        if !(1..=20).contains(&top_k) {
            return Err(AppError::InvalidInput("top_k must be between 1 and 20".into()));
        }
    }
    Ok(())
}

/// `POST /api/compare` — compare a topic across parties, one row per party.
#[utoipa::path(
    post,
    path = "/api/compare",
    request_body = CompareRequest,
    responses((status = 200, description = "One answer row per party", body = CompareResponse)),
    tag = "compare"
)]
pub async fn compare(
    State(state): State<AppState>,
    Json(request): Json<CompareRequest>,
) -> Result<Json<CompareResponse>> {
    validate(&request)?;

    for party in &request.parties {
        if !state.parties.read().contains(party) {
            return Err(AppError::InvalidInput(format!("unknown party '{party}'")));
        }
    }

    let response = state
        .pipeline
        .compare(&request.topic, &request.parties, request.top_k)
        .await?;
    Ok(Json(response))
}
