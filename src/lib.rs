//! # ticobot-rag
//!
//! A Retrieval-Augmented Generation backend for comparing Costa Rican
//! political party government plans ("planes de gobierno"): ingest PDFs,
//! answer questions grounded in the ingested text, and compare a topic
//! across parties, with sources cited back to page numbers.
//!
//! ## Overview
//!
//! ticobot-rag can be used in two ways:
//!
//! 1. **As a standalone server** — run the `ticobot-rag-server` binary.
//! 2. **As a library** — import the pipeline and provider abstractions
//!    into your own Rust project.
//!
//! ### Basic example
//!
//! ```rust,ignore
//! use ticobot_rag::llm::{ChatMessage, CompletionOptions, Provider, Role};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = Provider::Ollama {
//!         base_url: "http://localhost:11434".to_string(),
//!         model: "llama3.2:3b".to_string(),
//!         context_window: 8_192,
//!     };
//!     let client = provider.create_client().await?;
//!     let messages = [ChatMessage { role: Role::User, content: "Hola".to_string() }];
//!     let response = client.complete(&messages, &CompletionOptions::default()).await?;
//!     println!("{}", response.content);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ollama` | Ollama local inference |
//! | `openai` | OpenAI-compatible LLM and embeddings |
//! | `local-embeddings` | Local ONNX embeddings via `fastembed` |
//! | `ticobot-vector` | Embedded HNSW vector store (default) |
//! | `pgvector` | PostgreSQL + pgvector backend |
//! | `swagger-ui` | Serve OpenAPI docs at `/docs` |
//!
//! ## Modules
//!
//! - [`api`] — REST API handlers and routes
//! - [`auth`] — caller-identity extraction
//! - [`db`] — vector store backends and document metadata
//! - [`llm`] — LLM provider clients
//! - [`rag`] — the RAG pipeline itself (C1-C14)
//! - [`types`] — shared request/response/domain types and error handling
//! - [`utils`] — environment configuration and hot-reloadable tunables

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// HTTP API handlers and routes.
pub mod api;
/// Caller-identity extraction (not authentication; see module docs).
pub mod auth;
/// `ticobot-rag-ingest` CLI argument parsing and exit-code policy.
pub mod cli;
/// Vector store backends (C3) and document metadata storage.
pub mod db;
/// LLM provider clients and abstractions (C2).
pub mod llm;
/// Retrieval Augmented Generation components (C1, C4, C7-C14).
pub mod rag;
/// Shared request/response/domain types and error handling.
pub mod types;
/// Environment configuration and hot-reloadable tunables.
pub mod utils;

pub use llm::{LLMClient, LLMResponse, Provider as LLMProvider};
pub use rag::embeddings::Provider as EmbeddingProvider;
pub use rag::pipeline::{QueryOptions, RagPipeline};
pub use types::{AppError, Result};
pub use utils::{RagConfig, Tunables, TunablesManager};

use std::sync::Arc;

use parking_lot::RwLock;

use crate::db::vectorstore::VectorStore;
use crate::db::DocumentStore;
use crate::rag::ingest::IngestionPipeline;
use crate::types::PartyRegistry;

/// Application state shared across HTTP handlers.
///
/// Holds the long-lived pipeline and store handles built once at startup
/// in `main`; handlers reach into this via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Query-time RAG pipeline (C10-C14): `/chat`, `/chat/stream`, `/compare`.
    pub pipeline: Arc<RagPipeline>,
    /// Ingestion pipeline (C5-C9): `/ingest`, `/ingest/batch`.
    pub ingestion: Arc<IngestionPipeline>,
    /// Vector store backend, shared with both pipelines.
    pub vector_store: Arc<dyn VectorStore>,
    /// Document metadata store.
    pub documents: Arc<DocumentStore>,
    /// Known political parties.
    pub parties: Arc<RwLock<PartyRegistry>>,
    /// Vector store collection all documents/chunks live in.
    pub collection: String,
    /// Hot-reloadable retrieval tunables (similarity threshold, top-k, quality cutoff).
    pub tunables: Arc<TunablesManager>,
    /// Configured LLM provider's human-readable name, for `/health`.
    pub llm_provider_name: String,
    /// Configured embedding provider's human-readable name, for `/health`.
    pub embedding_provider_name: String,
}
