//! Caller identity extraction.
//!
//! Authentication (who is allowed to call the API) is an external
//! collaborator's concern per spec §1/§6: a gateway or reverse proxy
//! authenticates the caller and forwards an opaque identity. This module
//! only extracts that identity for logging/rate-limiting; it never
//! verifies credentials itself.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};

/// The caller's identity, as handed to us by an upstream auth layer via the
/// `X-Caller-Id` header. Opaque: the RAG core does not interpret it beyond
/// logging and cache/rate-limit partitioning.
#[derive(Debug, Clone)]
pub struct AuthUser(pub String);

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-caller-id")
            .and_then(|v| v.to_str().ok())
            .map(|v| AuthUser(v.to_string()))
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}
