//! `/health` handler.

use axum::extract::State;
use axum::Json;

use crate::types::HealthResponse;
use crate::AppState;

/// `GET /api/health` — liveness and configured-provider diagnostics.
#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Liveness and provider diagnostics", body = HealthResponse)),
    tag = "health"
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        llm_provider: state.llm_provider_name.clone(),
        embedding_provider: state.embedding_provider_name.clone(),
        vector_store_provider: state.vector_store.provider_name().to_string(),
    })
}
