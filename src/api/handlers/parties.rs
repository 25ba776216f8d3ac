//! `/parties` handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::types::{AppError, Party, PartySummary, Result};
use crate::AppState;

const MAX_PARTIES_PAGE: usize = 100;

/// Query parameters for `GET /api/parties`.
#[derive(Debug, Deserialize)]
pub struct ListPartiesQuery {
    /// Number of leading parties to skip. Defaults to 0.
    #[serde(default)]
    pub offset: usize,
    /// Maximum number of parties to return, capped at [`MAX_PARTIES_PAGE`].
    pub limit: Option<usize>,
}

/// `GET /api/parties` — list known parties with their ingested document counts.
///
/// Parties are returned in a stable order (by slug) so `offset`/`limit`
/// paging is consistent across calls.
#[utoipa::path(
    get,
    path = "/api/parties",
    params(
        ("offset" = Option<usize>, Query, description = "Number of parties to skip"),
        ("limit" = Option<usize>, Query, description = "Max parties to return (capped at 100)"),
    ),
    responses((status = 200, description = "Known parties", body = [PartySummary])),
    tag = "parties"
)]
pub async fn list_parties(
    State(state): State<AppState>,
    Query(query): Query<ListPartiesQuery>,
) -> Json<Vec<PartySummary>> {
    let limit = query.limit.unwrap_or(MAX_PARTIES_PAGE).min(MAX_PARTIES_PAGE);
    let parties = state.parties.read();
    let mut sorted = parties.list();
    sorted.sort_by(|a, b| a.slug.cmp(&b.slug));
    let summaries = sorted
        .into_iter()
        .skip(query.offset)
        .take(limit)
        .map(|party| PartySummary {
            slug: party.slug.clone(),
            name: party.name.clone(),
            abbreviation: party.abbreviation.clone(),
            document_count: state.documents.count_for_party(&party.slug),
        })
        .collect();
    Json(summaries)
}

/// `GET /api/parties/{slug}` — one party's detail.
#[utoipa::path(
    get,
    path = "/api/parties/{slug}",
    responses(
        (status = 200, description = "Party detail", body = Party),
        (status = 404, description = "Unknown party"),
    ),
    tag = "parties"
)]
pub async fn get_party(State(state): State<AppState>, Path(slug): Path<String>) -> Result<Json<Party>> {
    state
        .parties
        .read()
        .get(&slug)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("party '{slug}' not found")))
}
