use axum::routing::{get, post};
use axum::Router;

use crate::api::handlers::{chat, compare, documents, health, ingest, parties};
use crate::AppState;

/// Assemble the `/api`-mounted router. Caller identity (where a handler
/// needs it) is extracted per-request via [`crate::auth::AuthUser`] rather
/// than enforced by middleware here — see that module's docs for why.
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat::chat))
        .route("/chat/stream", post(chat::chat_stream))
        .route("/compare", post(compare::compare))
        .route("/parties", get(parties::list_parties))
        .route("/parties/{slug}", get(parties::get_party))
        .route("/documents", get(documents::list_documents))
        .route("/documents/{id}/chunks", get(documents::list_document_chunks))
        .route("/ingest", post(ingest::ingest))
        .route("/ingest/batch", post(ingest::ingest_batch))
        .route("/health", get(health::health))
}
