//! API request handlers.
//!
//! Organized one module per endpoint group, matching the router in
//! [`crate::api::routes`].

/// `/chat` and `/chat/stream` handlers.
pub mod chat;
/// `/compare` handler.
pub mod compare;
/// `/documents` and `/documents/{id}/chunks` handlers (admin).
pub mod documents;
/// `/health` handler.
pub mod health;
/// `/ingest` and `/ingest/batch` handlers (admin).
pub mod ingest;
/// `/parties` and `/parties/{slug}` handlers.
pub mod parties;
