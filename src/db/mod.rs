//! Vector store backends (C3) and the document metadata store.

/// Embedded HNSW index backed by `ticobot-vector` (default).
#[cfg(feature = "ticobot-vector")]
pub mod hnsw_store;

/// Optional PostgreSQL + pgvector backend.
#[cfg(feature = "pgvector")]
pub mod pgvector;

/// In-memory `IngestedDocument` records, keyed by document id.
pub mod documents;

/// Backend-agnostic trait, provider selection, and the in-memory reference
/// implementation.
pub mod vectorstore;

pub use documents::DocumentStore;
pub use vectorstore::{
    CollectionInfo, CollectionStats, InMemoryVectorStore, MetadataFilter, VectorStore,
    VectorStoreProvider,
};
