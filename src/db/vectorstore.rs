//! Vector Store Abstraction Layer
//!
//! This module provides a unified interface for vector database operations,
//! allowing the application to work with multiple vector store backends
//! through a common trait. Chunks are persisted and retrieved keyed by
//! `(document_id, chunk_index)`, and similarity search is threshold-plus-k:
//! up to `k` results strictly above a configured cosine-similarity threshold.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      VectorStore Trait                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │ upsert_chunks │ delete_by_document │ similarity_search │ ... │
//! └─────────────────────────────────────────────────────────────┘
//!          ▲                ▲                    ▲
//!          │                │                    │
//!    ┌─────┴────┐    ┌─────┴──────┐       ┌──────┴──────┐
//!    │ HnswStore│    │  InMemory  │       │  pgvector   │
//!    │ (default)│    │ (reference)│       │  (optional) │
//!    └──────────┘    └────────────┘       └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use ticobot_rag::db::vectorstore::{VectorStore, VectorStoreProvider};
//!
//! let store = VectorStoreProvider::Hnsw { path: None }.create_store().await?;
//! store.create_collection("documents", 384).await?;
//! store.upsert_chunks("documents", &chunks).await?;
//! let results = store.similarity_search("documents", &query_embedding, 10, 0.35, &[]).await?;
//! ```

use crate::types::{AppError, Chunk, Result, SearchResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// Vector Store Provider Configuration
// ============================================================================

/// Configuration for vector store providers.
///
/// Each variant contains the necessary configuration to connect to
/// a specific vector database backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum VectorStoreProvider {
    /// Pure-Rust embedded HNSW index (default, local-first).
    ///
    /// No native dependencies, compiles anywhere Rust does.
    #[cfg(feature = "ticobot-vector")]
    Hnsw {
        /// Path to the data directory (None for in-memory).
        path: Option<String>,
    },

    /// pgvector - PostgreSQL extension for vector similarity search.
    ///
    /// Requires PostgreSQL with pgvector extension installed.
    #[cfg(feature = "pgvector")]
    PgVector {
        /// PostgreSQL connection string.
        connection_string: String,
    },

    /// In-memory vector store for testing.
    ///
    /// Data is not persisted and will be lost when the process exits.
    InMemory,
}

impl VectorStoreProvider {
    /// Create a vector store instance from this provider configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or the provider
    /// feature is not enabled.
    pub async fn create_store(&self) -> Result<Box<dyn VectorStore>> {
        match self {
            #[cfg(feature = "ticobot-vector")]
            VectorStoreProvider::Hnsw { path } => {
                let store = super::hnsw_store::HnswVectorStore::new(path.clone()).await?;
                Ok(Box::new(store))
            }

            #[cfg(feature = "pgvector")]
            VectorStoreProvider::PgVector { connection_string } => {
                let store = super::pgvector::PgVectorStore::new(connection_string).await?;
                Ok(Box::new(store))
            }

            VectorStoreProvider::InMemory => {
                let store = InMemoryVectorStore::new();
                Ok(Box::new(store))
            }

            #[allow(unreachable_patterns)]
            _ => Err(AppError::Configuration(
                "Vector store provider not enabled. Check feature flags.".into(),
            )),
        }
    }

    /// Create a provider from environment variables.
    ///
    /// Checks for provider-specific environment variables in order:
    /// 1. `TICOBOT_VECTOR_PATH` → Hnsw (default)
    /// 2. `PGVECTOR_URL` → pgvector
    /// 3. Falls back to an in-memory Hnsw index, or `InMemory` if that
    ///    feature is disabled.
    pub fn from_env() -> Self {
        #[cfg(feature = "ticobot-vector")]
        if let Ok(path) = std::env::var("TICOBOT_VECTOR_PATH") {
            return VectorStoreProvider::Hnsw { path: Some(path) };
        }

        #[cfg(feature = "pgvector")]
        if let Ok(connection_string) = std::env::var("PGVECTOR_URL") {
            return VectorStoreProvider::PgVector { connection_string };
        }

        #[cfg(feature = "ticobot-vector")]
        return VectorStoreProvider::Hnsw { path: None };

        #[cfg(not(feature = "ticobot-vector"))]
        VectorStoreProvider::InMemory
    }
}

// ============================================================================
// Collection Statistics
// ============================================================================

/// Statistics about a vector collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionStats {
    /// Name of the collection.
    pub name: String,
    /// Number of chunks in the collection.
    pub chunk_count: usize,
    /// Dimensionality of vectors in the collection.
    pub dimensions: usize,
    /// Size of the index in bytes (if available).
    pub index_size_bytes: Option<u64>,
    /// Distance metric used (e.g., "cosine").
    pub distance_metric: String,
}

/// Information about a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Name of the collection.
    pub name: String,
    /// Number of chunks in the collection.
    pub chunk_count: usize,
    /// Vector dimensions.
    pub dimensions: usize,
}

/// An equality filter applied to chunk metadata during search.
pub type MetadataFilter = (String, String);

// ============================================================================
// Vector Store Trait
// ============================================================================

/// Abstract trait for vector database operations.
///
/// This trait defines a common interface for all vector store backends,
/// enabling the application to work with different databases interchangeably.
/// Chunks are addressed by `(document_id, chunk_index)`: upserting a chunk
/// with an existing key replaces it.
///
/// # Implementors
///
/// - `HnswVectorStore` - embedded HNSW index (default)
/// - `PgVectorStore` - PostgreSQL extension (optional)
/// - `InMemoryVectorStore` - linear-scan reference implementation, testing
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Get the name of this vector store provider.
    fn provider_name(&self) -> &'static str;

    /// Create a new collection with the specified vector dimensions.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection already exists or creation fails.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Delete a collection and all its data.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// List all collections in the vector store.
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;

    /// Check if a collection exists.
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Get statistics about a collection.
    async fn collection_stats(&self, name: &str) -> Result<CollectionStats>;

    /// Upsert chunks, replacing any existing chunk with the same
    /// `(document_id, chunk_index)`. Atomic per batch: either all chunks
    /// land or none do.
    ///
    /// # Errors
    ///
    /// Returns an error if any chunk is missing an embedding, any
    /// embedding's dimension differs from the collection's configured
    /// dimension, or the upsert operation fails.
    async fn upsert_chunks(&self, collection: &str, chunks: &[Chunk]) -> Result<usize>;

    /// Delete every chunk belonging to one document.
    async fn delete_by_document(&self, collection: &str, document_id: &str) -> Result<usize>;

    /// List one document's chunks, ordered by `chunk_index`, for paginated
    /// inspection (admin `GET /documents/{id}/chunks`).
    async fn list_chunks_by_document(
        &self,
        collection: &str,
        document_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Chunk>>;

    /// Nearest-neighbor search by cosine similarity.
    ///
    /// Returns up to `k` results with similarity strictly above `threshold`,
    /// sorted descending by similarity; ties are broken by smaller raw
    /// distance, then by `chunk_index` ascending. `filters` is an optional
    /// conjunction of equality predicates on chunk metadata.
    async fn similarity_search(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
        threshold: f32,
        filters: &[MetadataFilter],
    ) -> Result<Vec<SearchResult>>;

    /// Count chunks in a collection, optionally matching a metadata filter.
    async fn count_chunks(&self, collection: &str, filter: Option<&MetadataFilter>) -> Result<usize>;
}

/// Break similarity-search ties: smaller distance first, then chunk_index
/// ascending. Shared by every `VectorStore` implementation so ordering is
/// identical across backends.
pub(crate) fn rank_results(mut results: Vec<SearchResult>) -> Vec<SearchResult> {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                a.distance
                    .partial_cmp(&b.distance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.chunk.chunk_index.cmp(&b.chunk.chunk_index))
    });
    results
}

fn matches_filters(chunk: &Chunk, filters: &[MetadataFilter]) -> bool {
    filters
        .iter()
        .all(|(field, value)| chunk.metadata.get(field).map(|v| v == value).unwrap_or(false))
}

/// Calculate cosine similarity between two vectors. Returns `(similarity,
/// distance)`, both `0.0` if the vectors differ in length or either is zero.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> (f32, f32) {
    if a.len() != b.len() {
        return (0.0, 1.0);
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return (0.0, 1.0);
    }

    let similarity = dot_product / (norm_a * norm_b);
    (similarity, 1.0 - similarity)
}

// ============================================================================
// In-Memory Vector Store (reference implementation, testing)
// ============================================================================

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory vector store: a linear-scan reference implementation.
///
/// Data is not persisted and will be lost when the process exits. Serves as
/// the spec's baseline `VectorStore` and as the default when no persistent
/// backend is configured.
pub struct InMemoryVectorStore {
    collections: Arc<RwLock<HashMap<String, InMemoryCollection>>>,
}

struct InMemoryCollection {
    dimensions: usize,
    // Keyed by (document_id, chunk_index) for replace-on-upsert semantics.
    chunks: HashMap<(String, usize), Chunk>,
}

impl InMemoryVectorStore {
    /// Create a new in-memory vector store.
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn provider_name(&self) -> &'static str {
        "in-memory"
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(AppError::InvalidInput(format!(
                "Collection '{}' already exists",
                name
            )));
        }
        collections.insert(
            name.to_string(),
            InMemoryCollection {
                dimensions,
                chunks: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write();
        collections
            .remove(name)
            .ok_or_else(|| AppError::NotFound(format!("Collection '{}' not found", name)))?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let collections = self.collections.read();
        Ok(collections
            .iter()
            .map(|(name, col)| CollectionInfo {
                name: name.clone(),
                chunk_count: col.chunks.len(),
                dimensions: col.dimensions,
            })
            .collect())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let collections = self.collections.read();
        Ok(collections.contains_key(name))
    }

    async fn collection_stats(&self, name: &str) -> Result<CollectionStats> {
        let collections = self.collections.read();
        let col = collections
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("Collection '{}' not found", name)))?;

        Ok(CollectionStats {
            name: name.to_string(),
            chunk_count: col.chunks.len(),
            dimensions: col.dimensions,
            index_size_bytes: None,
            distance_metric: "cosine".to_string(),
        })
    }

    async fn upsert_chunks(&self, collection: &str, chunks: &[Chunk]) -> Result<usize> {
        let mut collections = self.collections.write();
        let col = collections
            .get_mut(collection)
            .ok_or_else(|| AppError::NotFound(format!("Collection '{}' not found", collection)))?;

        // Validate every chunk before mutating anything, so the batch is atomic.
        for chunk in chunks {
            let embedding = chunk.embedding.as_ref().ok_or_else(|| {
                AppError::InvalidInput(format!("Chunk '{}' is missing an embedding", chunk.id))
            })?;
            if embedding.len() != col.dimensions {
                return Err(AppError::InvalidInput(format!(
                    "Chunk '{}' has embedding dimension {} but collection '{}' expects {}",
                    chunk.id,
                    embedding.len(),
                    collection,
                    col.dimensions
                )));
            }
        }

        for chunk in chunks {
            col.chunks
                .insert((chunk.document_id.clone(), chunk.chunk_index), chunk.clone());
        }

        Ok(chunks.len())
    }

    async fn delete_by_document(&self, collection: &str, document_id: &str) -> Result<usize> {
        let mut collections = self.collections.write();
        let col = collections
            .get_mut(collection)
            .ok_or_else(|| AppError::NotFound(format!("Collection '{}' not found", collection)))?;

        let before = col.chunks.len();
        col.chunks.retain(|(doc_id, _), _| doc_id != document_id);
        Ok(before - col.chunks.len())
    }

    async fn similarity_search(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
        threshold: f32,
        filters: &[MetadataFilter],
    ) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read();
        let col = collections
            .get(collection)
            .ok_or_else(|| AppError::NotFound(format!("Collection '{}' not found", collection)))?;

        let results: Vec<SearchResult> = col
            .chunks
            .values()
            .filter(|chunk| matches_filters(chunk, filters))
            .filter_map(|chunk| {
                let chunk_embedding = chunk.embedding.as_ref()?;
                let (score, distance) = cosine_similarity(embedding, chunk_embedding);
                if score > threshold {
                    Some(SearchResult {
                        chunk: chunk.clone(),
                        score,
                        distance,
                    })
                } else {
                    None
                }
            })
            .collect();

        let mut results = rank_results(results);
        results.truncate(k);
        Ok(results)
    }

    async fn count_chunks(&self, collection: &str, filter: Option<&MetadataFilter>) -> Result<usize> {
        let collections = self.collections.read();
        let col = collections
            .get(collection)
            .ok_or_else(|| AppError::NotFound(format!("Collection '{}' not found", collection)))?;

        Ok(match filter {
            Some(f) => col
                .chunks
                .values()
                .filter(|c| matches_filters(c, std::slice::from_ref(f)))
                .count(),
            None => col.chunks.len(),
        })
    }

    async fn list_chunks_by_document(
        &self,
        collection: &str,
        document_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Chunk>> {
        let collections = self.collections.read();
        let col = collections
            .get(collection)
            .ok_or_else(|| AppError::NotFound(format!("Collection '{}' not found", collection)))?;

        let mut chunks: Vec<Chunk> = col
            .chunks
            .values()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks.into_iter().skip(offset).take(limit).collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn test_chunk(document_id: &str, chunk_index: usize, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: format!("{}#{}", document_id, chunk_index),
            document_id: document_id.to_string(),
            chunk_index,
            content: format!("chunk {} of {}", chunk_index, document_id),
            embedding: Some(embedding),
            token_count: 10,
            char_count: 40,
            page_range: None,
            quality_score: 1.0,
            quality_breakdown: Default::default(),
            keywords: vec![],
            entities: vec![],
            created_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_inmemory_create_collection() {
        let store = InMemoryVectorStore::new();
        store.create_collection("test", 3).await.unwrap();
        assert!(store.collection_exists("test").await.unwrap());
    }

    #[tokio::test]
    async fn test_inmemory_duplicate_collection_error() {
        let store = InMemoryVectorStore::new();
        store.create_collection("test", 3).await.unwrap();
        assert!(store.create_collection("test", 3).await.is_err());
    }

    #[tokio::test]
    async fn test_inmemory_upsert_rejects_dimension_mismatch() {
        let store = InMemoryVectorStore::new();
        store.create_collection("test", 3).await.unwrap();

        let bad = test_chunk("doc1", 0, vec![1.0, 0.0]);
        assert!(store.upsert_chunks("test", &[bad]).await.is_err());
        assert_eq!(store.count_chunks("test", None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_inmemory_upsert_replaces_by_document_and_index() {
        let store = InMemoryVectorStore::new();
        store.create_collection("test", 3).await.unwrap();

        let v1 = test_chunk("doc1", 0, vec![1.0, 0.0, 0.0]);
        store.upsert_chunks("test", &[v1]).await.unwrap();
        assert_eq!(store.count_chunks("test", None).await.unwrap(), 1);

        let mut v2 = test_chunk("doc1", 0, vec![0.0, 1.0, 0.0]);
        v2.content = "replaced".to_string();
        store.upsert_chunks("test", &[v2]).await.unwrap();

        assert_eq!(store.count_chunks("test", None).await.unwrap(), 1);
        let results = store
            .similarity_search("test", &[0.0, 1.0, 0.0], 10, 0.0, &[])
            .await
            .unwrap();
        assert_eq!(results[0].chunk.content, "replaced");
    }

    #[tokio::test]
    async fn test_inmemory_search_threshold_and_ranking() {
        let store = InMemoryVectorStore::new();
        store.create_collection("test", 3).await.unwrap();

        let c1 = test_chunk("doc1", 0, vec![1.0, 0.0, 0.0]);
        let c2 = test_chunk("doc2", 0, vec![0.0, 1.0, 0.0]);
        let c3 = test_chunk("doc1", 1, vec![0.9, 0.1, 0.0]);
        store.upsert_chunks("test", &[c1, c2, c3]).await.unwrap();

        let results = store
            .similarity_search("test", &[1.0, 0.0, 0.0], 10, 0.35, &[])
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.document_id, "doc1");
        assert_eq!(results[0].chunk.chunk_index, 0);
        assert_eq!(results[1].chunk.chunk_index, 1);
    }

    #[tokio::test]
    async fn test_inmemory_delete_by_document() {
        let store = InMemoryVectorStore::new();
        store.create_collection("test", 3).await.unwrap();

        let c1 = test_chunk("doc1", 0, vec![1.0, 0.0, 0.0]);
        let c2 = test_chunk("doc1", 1, vec![0.0, 1.0, 0.0]);
        let c3 = test_chunk("doc2", 0, vec![0.0, 0.0, 1.0]);
        store.upsert_chunks("test", &[c1, c2, c3]).await.unwrap();

        let deleted = store.delete_by_document("test", "doc1").await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.count_chunks("test", None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_inmemory_metadata_filter() {
        let store = InMemoryVectorStore::new();
        store.create_collection("test", 3).await.unwrap();

        let mut c1 = test_chunk("doc1", 0, vec![1.0, 0.0, 0.0]);
        c1.metadata.insert("party_id".to_string(), "pan".to_string());
        let mut c2 = test_chunk("doc2", 0, vec![1.0, 0.0, 0.0]);
        c2.metadata.insert("party_id".to_string(), "plp".to_string());
        store.upsert_chunks("test", &[c1, c2]).await.unwrap();

        let filters = [("party_id".to_string(), "pan".to_string())];
        let results = store
            .similarity_search("test", &[1.0, 0.0, 0.0], 10, 0.0, &filters)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.document_id, "doc1");
    }

    #[test]
    fn test_cosine_similarity() {
        let (sim, dist) = cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]);
        assert!((sim - 1.0).abs() < 0.001);
        assert!(dist.abs() < 0.001);

        let (sim, _) = cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]);
        assert!(sim.abs() < 0.001);

        let (sim, _) = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((sim + 1.0).abs() < 0.001);
    }
}
