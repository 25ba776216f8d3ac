//! HTTP API handlers and routes.
//!
//! This module provides the REST API surface for the RAG backend, built
//! on the Axum web framework.
//!
//! # Module structure
//!
//! - [`api::handlers`](crate::api::handlers) — request handlers for each endpoint
//! - [`api::routes`](crate::api::routes) — route definitions and router assembly
//!
//! # Endpoints
//!
//! All routes are mounted under `/api`.
//!
//! ## Chat
//! - `POST /api/chat` — ask a question, answered from the ingested corpus
//! - `POST /api/chat/stream` — same, as server-sent events
//!
//! ## Compare
//! - `POST /api/compare` — compare a topic across parties
//!
//! ## Parties
//! - `GET /api/parties` — list known parties
//! - `GET /api/parties/{slug}` — one party's detail
//!
//! ## Documents (admin)
//! - `GET /api/documents` — list ingested documents
//! - `GET /api/documents/{id}/chunks` — paginated chunk inspection
//!
//! ## Ingestion (admin)
//! - `POST /api/ingest` — ingest one document by URL
//! - `POST /api/ingest/batch` — ingest several documents sequentially
//!
//! ## Health
//! - `GET /api/health` — liveness and configured-provider diagnostics
//!
//! # Caller identity
//!
//! Authentication is an external collaborator's concern (§1/§6): handlers
//! that need to distinguish callers use the [`crate::auth::AuthUser`]
//! extractor, which trusts an upstream gateway's `X-Caller-Id` header.
//!
//! # OpenAPI documentation
//!
//! When the `swagger-ui` feature is enabled, interactive API documentation
//! is available at `/docs`.

/// Request and response handlers for all API endpoints.
pub mod handlers;
/// Router configuration and route definitions.
pub mod routes;
