//! Core types shared across the RAG pipeline and its HTTP surface.
//!
//! This module holds:
//! - the data model (§3): `Party`, `IngestedDocument`, `Chunk`, `CacheEntry`
//! - search/query DTOs shared by C10–C14
//! - the HTTP request/response shapes (§6)
//! - the crate-wide error taxonomy (§7)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

// ============= Data Model (§3) =============

/// A political party, as a static reference entity. Not owned by the core:
/// an external collaborator supplies/maintains parties; this crate keeps an
/// in-memory [`PartyRegistry`] sufficient for filter validation and
/// citation formatting.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Party {
    /// Stable identifier (slug), e.g. `"pln"`.
    pub slug: String,
    /// Display name, e.g. `"Partido Liberación Nacional"`.
    pub name: String,
    /// Short abbreviation used in citations, e.g. `"PLN"`.
    pub abbreviation: String,
    /// Brand color, hex, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Free-form metadata bag.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// In-memory registry of known parties, sufficient for filter validation
/// and citation formatting. The core never owns party CRUD; callers seed
/// this from config or an admin call.
#[derive(Debug, Default)]
pub struct PartyRegistry {
    parties: HashMap<String, Party>,
}

impl PartyRegistry {
    /// Construct an empty registry.
    pub fn new() -> Self {
        Self {
            parties: HashMap::new(),
        }
    }

    /// Seed (or replace) one party.
    pub fn upsert(&mut self, party: Party) {
        self.parties.insert(party.slug.clone(), party);
    }

    /// Look up a party by slug.
    pub fn get(&self, slug: &str) -> Option<&Party> {
        self.parties.get(slug)
    }

    /// All known parties, in registration order is not guaranteed; ordering
    /// is delegated entirely to the external parties collaborator (§9).
    pub fn list(&self) -> Vec<&Party> {
        self.parties.values().collect()
    }

    /// Whether `slug` names a known party.
    pub fn contains(&self, slug: &str) -> bool {
        self.parties.contains_key(slug)
    }
}

/// One party's government plan, as ingested from a source PDF.
///
/// Mutated only by re-ingestion, which atomically replaces the document's
/// chunks; deleted only by admin action (cascades to its chunks).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IngestedDocument {
    /// Stable external identifier (used as the `document_id` chunks carry).
    pub id: String,
    /// Party this plan belongs to.
    pub party_id: String,
    /// URL the PDF was downloaded from.
    pub source_url: String,
    /// Local filesystem path of the persisted PDF bytes.
    pub local_path: String,
    /// Number of pages extracted.
    pub page_count: u32,
    /// Size of the source file in bytes.
    pub byte_size: u64,
    /// When the PDF bytes were downloaded.
    pub downloaded_at: DateTime<Utc>,
    /// When the document was last parsed into chunks.
    pub parsed_at: Option<DateTime<Utc>>,
    /// Free-form metadata bag (title, plan year, etc).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A contiguous segment of one document's text, the unit of retrieval.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Chunk {
    /// Unique, stable identifier for this chunk.
    pub id: String,
    /// Owning document's external identifier.
    pub document_id: String,
    /// 0-based, dense ordinal position within the document.
    pub chunk_index: usize,
    /// Cleaned UTF-8 text content.
    pub content: String,
    /// Embedding vector; `None` while the chunk is pending and invisible to
    /// retrieval.
    pub embedding: Option<Vec<f32>>,
    /// Token count, per the chunker's estimator.
    pub token_count: usize,
    /// Character count of `content`.
    pub char_count: usize,
    /// Source page range, when recoverable from the page index.
    pub page_range: Option<PageRange>,
    /// Overall quality score in [0, 1].
    pub quality_score: f32,
    /// Per-metric quality breakdown.
    pub quality_breakdown: QualityBreakdown,
    /// Extracted keywords, deduplicated.
    pub keywords: Vec<String>,
    /// Extracted named entities, deduplicated.
    pub entities: Vec<String>,
    /// When this chunk was created (ingestion time, not re-ingestion time).
    pub created_at: DateTime<Utc>,
    /// Metadata bag for retrieval filters (e.g. `party_id`).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Inclusive page range a chunk's text was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PageRange {
    /// First source page (1-based).
    pub start: u32,
    /// Last source page (1-based), inclusive.
    pub end: u32,
}

/// Per-metric quality score breakdown, as produced by the quality scorer
/// (§4.8: length, special-char cleanliness, has-keywords, readability).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema)]
pub struct QualityBreakdown {
    /// Fraction of replacement/control characters, inverted (1.0 = clean).
    pub cleanliness: f32,
    /// Heuristic from average word length and sentence count, penalizing
    /// both extremes.
    pub readability: f32,
    /// Penalizes chunks far from the configured target token length.
    pub length_fit: f32,
    /// Whether the chunk mentions at least one curated domain keyword.
    pub has_keywords: bool,
}

/// One cited source attached to a generated answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Citation {
    /// Party abbreviation.
    pub party: String,
    /// Document title (from metadata, falls back to `document_id`).
    pub document: String,
    /// Source page, if recoverable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    /// Cosine similarity in [0, 1].
    pub similarity: f32,
    /// First ~200 characters of the cited chunk.
    pub snippet: String,
}

/// Immutable record of a previously computed answer (§3 CacheEntry).
///
/// A `CacheEntry` may outlive the chunks it cited; readers must tolerate
/// broken references in cached sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Hash of the normalized question alone.
    pub question_hash: String,
    /// Hash of the normalized question plus retrieval parameters.
    pub params_hash: String,
    /// Original question text, pre-normalization.
    pub question: String,
    /// Party filter in effect when this was computed, if any.
    pub party_filter: Option<String>,
    /// Generated answer text.
    pub answer: String,
    /// Sources cited in the answer.
    pub sources: Vec<Citation>,
    /// Model name used to compute this answer.
    pub model: String,
    /// Total tokens used computing this answer.
    pub tokens_used: u32,
    /// When this entry was computed.
    pub computed_at: DateTime<Utc>,
    /// When this entry expires, if ever.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Immutable record of a previously computed topic-vs-party comparison
/// (§3 CacheEntry, §4.4 Comparison Cache). Keyed by `(topic_hash,
/// parties_hash)` rather than `(question_hash, params_hash)`; otherwise
/// the same lazy-expiration lifecycle as [`CacheEntry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonCacheEntry {
    /// Hash of the normalized topic alone.
    pub topic_hash: String,
    /// Hash of the sorted, comma-joined party id list.
    pub parties_hash: String,
    /// Original topic text, pre-normalization.
    pub topic: String,
    /// Parties compared, in request order.
    pub parties: Vec<String>,
    /// One row per party.
    pub rows: Vec<ComparisonRow>,
    /// Model name used to compute this comparison.
    pub model: String,
    /// When this entry was computed.
    pub computed_at: DateTime<Utc>,
    /// When this entry expires; `None` for admin-precomputed comparisons
    /// (§4.14 step 9).
    pub expires_at: Option<DateTime<Utc>>,
}

/// Maximum accepted question length, in characters (§8 boundary 13).
pub const MAX_QUESTION_LEN: usize = 2_000;

/// Query parameters for semantic search.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// The search query text.
    pub query: String,
    /// Maximum number of results to return.
    pub limit: usize,
    /// Minimum similarity threshold (0.0 to 1.0).
    pub threshold: f32,
    /// Optional equality filters, conjoined, applied to chunk metadata.
    pub filters: Option<Vec<SearchFilter>>,
}

/// An equality filter applied to chunk metadata during search.
#[derive(Debug, Clone)]
pub struct SearchFilter {
    /// Field name to filter on.
    pub field: String,
    /// Value to filter by.
    pub value: String,
}

/// A single search result with relevance score.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// The matching chunk.
    pub chunk: Chunk,
    /// Cosine similarity in [0, 1] (`1 - cosine_distance`).
    pub score: f32,
    /// Raw cosine distance, kept for tie-breaking (smaller wins).
    pub distance: f32,
}

/// Query intent, as classified by the query processor (C10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    /// A direct factual question.
    Question,
    /// A cross-party comparison request.
    Comparison,
    /// A lookup of a specific proposal or fact.
    Lookup,
    /// An opinion or stance probe ("what does party X think about...").
    OpinionProbe,
}

impl Default for QueryIntent {
    fn default() -> Self {
        QueryIntent::Question
    }
}

/// Structured view of a user query produced by the query processor (C10).
///
/// `camelCase` wire format matches the TOON record the LLM is prompted to
/// emit (§4.10): `keywords`, `entities`, `intent`, `enhancedQuery`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedQuery {
    /// Extracted keywords.
    pub keywords: Vec<String>,
    /// Extracted entities (party abbreviations or proper nouns).
    pub entities: Vec<String>,
    /// Classified intent.
    pub intent: QueryIntent,
    /// Paraphrased query, expanded with likely synonyms.
    pub enhanced_query: String,
}

// ============= HTTP API Types (§6) =============

/// `POST /chat` request body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatRequest {
    /// The user's natural-language question.
    pub question: String,
    /// Restrict retrieval to one party, by slug.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub party_filter: Option<String>,
    /// Maximum chunks to retrieve (1..20), default 5.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    /// Minimum cosine similarity (0..1), default 0.35.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,
    /// Whether the caller intends to use the streaming endpoint instead.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

/// `POST /chat` response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    /// Generated answer text.
    pub answer: String,
    /// Cited sources.
    pub sources: Vec<Citation>,
    /// Confidence in [0, 1].
    pub confidence: f32,
    /// Request-level metadata.
    pub metadata: ChatResponseMetadata,
}

/// Metadata accompanying a [`ChatResponse`].
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatResponseMetadata {
    /// Whether this response was served from cache.
    pub cached: bool,
    /// LLM model that generated the answer.
    pub model: String,
    /// Tokens used, if available (absent for cached responses).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
    /// Wall-clock time to produce this response.
    pub processing_time_ms: u64,
    /// Chunks retrieved above threshold.
    pub chunks_retrieved: usize,
    /// Chunks actually included in the context after budget truncation.
    pub chunks_used: usize,
}

/// `POST /compare` request body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CompareRequest {
    /// The topic to compare across parties.
    pub topic: String,
    /// Parties to compare; empty means "all known parties".
    #[serde(default)]
    pub parties: Vec<String>,
    /// Maximum chunks to retrieve per party, default 5.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

/// One party's row in a `/compare` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ComparisonRow {
    /// Party slug.
    pub party: String,
    /// Party-specific answer to the comparison topic.
    pub answer: String,
    /// Sources cited for this party's row.
    pub sources: Vec<Citation>,
}

/// `POST /compare` response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CompareResponse {
    /// Topic compared.
    pub topic: String,
    /// One row per party.
    pub rows: Vec<ComparisonRow>,
    /// Response metadata, same shape as chat.
    pub metadata: ChatResponseMetadata,
}

/// `GET /parties` response entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PartySummary {
    /// Party slug.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Abbreviation.
    pub abbreviation: String,
    /// Number of ingested documents.
    pub document_count: usize,
}

/// `GET /documents` response entry.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct DocumentSummary {
    /// Document id.
    pub id: String,
    /// Owning party.
    pub party_id: String,
    /// Source URL.
    pub source_url: String,
    /// Number of chunks currently persisted for this document.
    pub chunk_count: usize,
    /// Page count.
    pub page_count: u32,
    /// When downloaded.
    pub downloaded_at: DateTime<Utc>,
}

/// `POST /ingest` request body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IngestRequest {
    /// URL to download the PDF from.
    pub url: String,
    /// Stable external document id.
    pub doc_id: String,
    /// Owning party slug.
    pub party_id: String,
    /// Free-form metadata to attach to the document.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// `POST /ingest/batch` request body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IngestBatchRequest {
    /// Documents to ingest, processed sequentially.
    pub documents: Vec<IngestRequest>,
}

/// Per-document outcome of an ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    /// All stages completed and chunks are persisted.
    Success,
    /// Document persisted but with zero eligible chunks (all below quality
    /// threshold), or some non-fatal degradation occurred.
    Partial,
    /// Document was not persisted.
    Failed,
}

/// Result of ingesting one document (C9).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IngestResult {
    /// Document id that was ingested.
    pub doc_id: String,
    /// Outcome.
    pub status: IngestStatus,
    /// Error kind + message, if not fully successful.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of chunks persisted.
    pub chunk_count: usize,
    /// Average tokens per persisted chunk.
    pub avg_tokens: f32,
    /// Per-stage timing, in milliseconds.
    pub stats: IngestStats,
}

/// Per-stage timing for one document's ingestion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, ToSchema)]
pub struct IngestStats {
    /// Milliseconds spent downloading.
    pub download_ms: u64,
    /// Milliseconds spent parsing the PDF.
    pub parse_ms: u64,
    /// Milliseconds spent cleaning extracted text.
    pub clean_ms: u64,
    /// Milliseconds spent chunking.
    pub chunk_ms: u64,
    /// Milliseconds spent embedding.
    pub embed_ms: u64,
    /// Milliseconds spent persisting.
    pub persist_ms: u64,
}

/// `POST /ingest/batch` response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IngestBatchResponse {
    /// One result per requested document, in request order.
    pub results: Vec<IngestResult>,
}

/// `GET /health` response body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Always `"ok"` if the process can respond at all.
    pub status: String,
    /// Configured LLM provider name.
    pub llm_provider: String,
    /// Configured embedding provider name.
    pub embedding_provider: String,
    /// Configured vector store provider name.
    pub vector_store_provider: String,
}

// ============= Error Types (§7) =============

/// Application-wide error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Requested resource was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Input validation failed.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error; fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// An LLM, embedding, or vector store provider was unreachable or
    /// returned a transport error. Retryable at the boundary.
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Combined prompt/context exceeded the provider's context window.
    /// Indicates a bug in context-budget math; not retryable as-is.
    #[error("Context window exceeded: {0}")]
    ContextOverflow(String),

    /// The provider withheld output via a content filter.
    #[error("Content filtered: {0}")]
    ContentFiltered(String),

    /// A document download failed. `transient` distinguishes a retryable
    /// failure (timeout, 5xx, connection reset) from a permanent one
    /// (404, malformed URL).
    #[error("Download failed: {message}")]
    DownloadFailed {
        /// Whether a retry might succeed.
        transient: bool,
        /// Human-readable detail.
        message: String,
    },

    /// PDF or text extraction failed (corrupt file, unsupported encoding).
    #[error("Parse failed: {0}")]
    ParseFailed(String),

    /// The vector store or document registry rejected a write.
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// Cache read/write failed. Callers treat this as a miss, never as a
    /// user-facing error; the variant exists so internals can log it.
    #[error("Cache error: {0}")]
    CacheError(String),
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (axum::http::StatusCode::NOT_FOUND, msg),
            AppError::InvalidInput(msg) => (axum::http::StatusCode::BAD_REQUEST, msg),
            AppError::Configuration(msg) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::Internal(msg) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::ProviderUnavailable(msg) => (axum::http::StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::ContextOverflow(msg) => (axum::http::StatusCode::PAYLOAD_TOO_LARGE, msg),
            AppError::ContentFiltered(msg) => (axum::http::StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::DownloadFailed { message, .. } => {
                (axum::http::StatusCode::BAD_GATEWAY, message)
            }
            AppError::ParseFailed(msg) => (axum::http::StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::PersistenceError(msg) => {
                (axum::http::StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            AppError::CacheError(msg) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

/// A specialized Result type for this crate's operations.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn party_registry_roundtrip() {
        let mut registry = PartyRegistry::new();
        registry.upsert(Party {
            slug: "pln".into(),
            name: "Partido Liberación Nacional".into(),
            abbreviation: "PLN".into(),
            color: None,
            metadata: HashMap::new(),
        });
        assert!(registry.contains("pln"));
        assert!(!registry.contains("pusc"));
        assert_eq!(registry.get("pln").unwrap().abbreviation, "PLN");
    }

    #[test]
    fn enhanced_query_default_intent_is_question() {
        let q = EnhancedQuery::default();
        assert_eq!(q.intent, QueryIntent::Question);
    }
}
