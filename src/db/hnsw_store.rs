//! HNSW-backed vector store.
//!
//! This module provides the default, production vector store: a high
//! performance, pure-Rust embedded database using the HNSW (Hierarchical
//! Navigable Small World) algorithm via the workspace's `ticobot-vector`
//! crate.
//!
//! # Features
//!
//! - **No native dependencies**: compiles on any platform Rust supports.
//! - **Embedded**: no separate server process required.
//! - **Persistent**: optional disk persistence alongside the HNSW index.
//! - **Thread-safe**: `VectorDb` is `Clone` and internally synchronized.
//!
//! # Example
//!
//! ```rust,ignore
//! let store = HnswVectorStore::new(Some("./data/vectors".into())).await?;
//! store.create_collection("documents", 384).await?;
//! store.upsert_chunks("documents", &chunks).await?;
//! let results = store.similarity_search("documents", &embedding, 10, 0.35, &[]).await?;
//! ```

use crate::types::{AppError, Chunk, Result, SearchResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::vectorstore::{rank_results, CollectionInfo, CollectionStats, MetadataFilter, VectorStore};
use ticobot_vector::types::MetadataValue;
use ticobot_vector::{Config, DistanceMetric, VectorDb, VectorMetadata};

/// Composite id the underlying HNSW index stores a chunk under.
fn vector_id(document_id: &str, chunk_index: usize) -> String {
    format!("{}#{}", document_id, chunk_index)
}

/// Default vector store: an HNSW index with chunk content kept alongside it
/// for full retrieval (the index itself only returns id + score).
pub struct HnswVectorStore {
    /// The underlying vector database (`VectorDb` is `Clone`, backed by `Arc`).
    db: VectorDb,
    /// Storage path (`None` for in-memory).
    path: Option<PathBuf>,
    /// Chunk storage, keyed by collection then `(document_id, chunk_index)`.
    chunks: Arc<RwLock<HashMap<String, HashMap<(String, usize), Chunk>>>>,
}

impl HnswVectorStore {
    /// Create a new HNSW-backed store.
    ///
    /// # Arguments
    ///
    /// * `path` - Optional path to persist data. If `None`, operates in-memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized or loaded.
    pub async fn new(path: Option<String>) -> Result<Self> {
        let path_buf = path.map(PathBuf::from);

        let config = if let Some(ref p) = path_buf {
            Config::persistent(p.to_string_lossy().to_string())
        } else {
            Config::memory()
        };

        let db = VectorDb::open(config)
            .await
            .map_err(|e| AppError::Configuration(format!("Failed to initialize vector store: {}", e)))?;

        let store = Self {
            db,
            path: path_buf,
            chunks: Arc::new(RwLock::new(HashMap::new())),
        };

        if let Some(ref path) = store.path {
            store.load_chunks(path).await?;
        }

        Ok(store)
    }

    /// Load persisted chunk content from disk.
    async fn load_chunks(&self, path: &Path) -> Result<()> {
        let chunks_path = path.join("chunks.json");
        if chunks_path.exists() {
            let data = tokio::fs::read_to_string(&chunks_path)
                .await
                .map_err(|e| AppError::Configuration(format!("Failed to read chunks file: {}", e)))?;

            let loaded: HashMap<String, Vec<Chunk>> = serde_json::from_str(&data)
                .map_err(|e| AppError::Configuration(format!("Failed to parse chunks file: {}", e)))?;

            let mut chunks = self.chunks.write();
            for (collection, collection_chunks) in loaded {
                let map = chunks.entry(collection).or_default();
                for chunk in collection_chunks {
                    map.insert((chunk.document_id.clone(), chunk.chunk_index), chunk);
                }
            }
        }
        Ok(())
    }

    /// Persist chunk content to disk.
    async fn save_chunks(&self) -> Result<()> {
        if let Some(ref path) = self.path {
            let data = {
                let chunks = self.chunks.read();
                let flattened: HashMap<String, Vec<Chunk>> = chunks
                    .iter()
                    .map(|(collection, map)| (collection.clone(), map.values().cloned().collect()))
                    .collect();
                serde_json::to_string_pretty(&flattened)
                    .map_err(|e| AppError::Internal(format!("Failed to serialize chunks: {}", e)))?
            };

            tokio::fs::create_dir_all(path)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to create data directory: {}", e)))?;

            let chunks_path = path.join("chunks.json");
            tokio::fs::write(&chunks_path, data)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to write chunks file: {}", e)))?;
        }
        Ok(())
    }

    fn chunk_metadata(chunk: &Chunk) -> VectorMetadata {
        let mut pairs: Vec<(String, MetadataValue)> = vec![
            ("document_id".to_string(), MetadataValue::String(chunk.document_id.clone())),
            ("chunk_index".to_string(), MetadataValue::Int(chunk.chunk_index as i64)),
        ];
        for (k, v) in &chunk.metadata {
            pairs.push((k.clone(), MetadataValue::String(v.clone())));
        }
        VectorMetadata::from_pairs(pairs)
    }
}

#[async_trait]
impl VectorStore for HnswVectorStore {
    fn provider_name(&self) -> &'static str {
        "ticobot-vector"
    }

    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        if self.db.list_collections().contains(&name.to_string()) {
            return Err(AppError::Configuration(format!(
                "Collection '{}' already exists",
                name
            )));
        }

        self.db
            .create_collection(name, dimensions, DistanceMetric::Cosine)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create collection: {}", e)))?;

        {
            let mut chunks = self.chunks.write();
            chunks.insert(name.to_string(), HashMap::new());
        }

        if self.path.is_some() {
            self.save_chunks().await?;
        }

        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.db
            .delete_collection(name)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to delete collection: {}", e)))?;

        {
            let mut chunks = self.chunks.write();
            chunks.remove(name);
        }

        if self.path.is_some() {
            self.save_chunks().await?;
        }

        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let collections = self.db.list_collections();

        let mut infos = Vec::with_capacity(collections.len());
        for name in collections {
            if let Ok(collection) = self.db.get_collection(&name) {
                let stats = collection.stats();
                infos.push(CollectionInfo {
                    name,
                    dimensions: stats.dimensions,
                    chunk_count: stats.vector_count,
                });
            }
        }

        Ok(infos)
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.db.list_collections().contains(&name.to_string()))
    }

    async fn collection_stats(&self, name: &str) -> Result<CollectionStats> {
        let collection = self
            .db
            .get_collection(name)
            .map_err(|_| AppError::NotFound(format!("Collection '{}' not found", name)))?;

        let stats = collection.stats();

        Ok(CollectionStats {
            name: stats.name,
            chunk_count: stats.vector_count,
            dimensions: stats.dimensions,
            index_size_bytes: Some(stats.memory_bytes as u64),
            distance_metric: format!("{:?}", stats.metric),
        })
    }

    async fn upsert_chunks(&self, collection: &str, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let col = self
            .db
            .get_collection(collection)
            .map_err(|_| AppError::NotFound(format!("Collection '{}' not found", collection)))?;
        let dimensions = col.dimensions();

        // Validate the whole batch before mutating anything, so a rejected
        // chunk never leaves the collection partially updated.
        for chunk in chunks {
            let embedding = chunk
                .embedding
                .as_ref()
                .ok_or_else(|| AppError::InvalidInput(format!("Chunk '{}' is missing an embedding", chunk.id)))?;
            if embedding.len() != dimensions {
                return Err(AppError::InvalidInput(format!(
                    "Chunk '{}' has embedding dimension {} but collection '{}' expects {}",
                    chunk.id,
                    embedding.len(),
                    collection,
                    dimensions
                )));
            }
        }

        let mut upserted = 0;
        for chunk in chunks {
            let embedding = chunk.embedding.as_ref().expect("validated above");
            let id = vector_id(&chunk.document_id, chunk.chunk_index);
            let meta = Self::chunk_metadata(chunk);

            self.db
                .insert(collection, &id, embedding, Some(meta))
                .await
                .map_err(|e| AppError::Internal(format!("Failed to insert vector: {}", e)))?;

            {
                let mut all_chunks = self.chunks.write();
                let collection_chunks = all_chunks.entry(collection.to_string()).or_default();
                collection_chunks.insert((chunk.document_id.clone(), chunk.chunk_index), chunk.clone());
            }

            upserted += 1;
        }

        if self.path.is_some() {
            self.save_chunks().await?;
        }

        Ok(upserted)
    }

    async fn delete_by_document(&self, collection: &str, document_id: &str) -> Result<usize> {
        let keys: Vec<(String, usize)> = {
            let all_chunks = self.chunks.read();
            all_chunks
                .get(collection)
                .map(|m| {
                    m.keys()
                        .filter(|(doc_id, _)| doc_id == document_id)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut deleted = 0;
        for (doc_id, chunk_index) in &keys {
            let id = vector_id(doc_id, *chunk_index);
            if let Ok(true) = self.db.delete(collection, &id).await {
                let mut all_chunks = self.chunks.write();
                if let Some(collection_chunks) = all_chunks.get_mut(collection) {
                    if collection_chunks.remove(&(doc_id.clone(), *chunk_index)).is_some() {
                        deleted += 1;
                    }
                }
            }
        }

        if self.path.is_some() {
            self.save_chunks().await?;
        }

        Ok(deleted)
    }

    async fn similarity_search(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
        threshold: f32,
        filters: &[MetadataFilter],
    ) -> Result<Vec<SearchResult>> {
        // Over-fetch: the index applies no metadata filter, so pull extra
        // candidates and filter/threshold/rank on our side.
        let overfetch = (k * 4).max(k + 16);
        let vector_results = self
            .db
            .search(collection, embedding, overfetch)
            .await
            .map_err(|e| AppError::Internal(format!("Search failed: {}", e)))?;

        let all_chunks = self.chunks.read();
        let collection_chunks = all_chunks
            .get(collection)
            .ok_or_else(|| AppError::NotFound(format!("Collection '{}' not found", collection)))?;

        let mut results = Vec::new();
        for hit in vector_results {
            // hit.id is "{document_id}#{chunk_index}"; recover the chunk from
            // its own recorded fields rather than re-parsing the id.
            let Some(chunk) = collection_chunks
                .values()
                .find(|c| vector_id(&c.document_id, c.chunk_index) == hit.id)
            else {
                continue;
            };
            if !matches_filters(chunk, filters) {
                continue;
            }
            let score = hit.score;
            if score > threshold {
                results.push(SearchResult {
                    chunk: chunk.clone(),
                    score,
                    distance: 1.0 - score,
                });
            }
        }

        let mut results = rank_results(results);
        results.truncate(k);
        Ok(results)
    }

    async fn count_chunks(&self, collection: &str, filter: Option<&MetadataFilter>) -> Result<usize> {
        let all_chunks = self.chunks.read();
        let collection_chunks = all_chunks
            .get(collection)
            .ok_or_else(|| AppError::NotFound(format!("Collection '{}' not found", collection)))?;

        Ok(match filter {
            Some(f) => collection_chunks
                .values()
                .filter(|c| matches_filters(c, std::slice::from_ref(f)))
                .count(),
            None => collection_chunks.len(),
        })
    }

    async fn list_chunks_by_document(
        &self,
        collection: &str,
        document_id: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Chunk>> {
        let all_chunks = self.chunks.read();
        let collection_chunks = all_chunks
            .get(collection)
            .ok_or_else(|| AppError::NotFound(format!("Collection '{}' not found", collection)))?;

        let mut chunks: Vec<Chunk> = collection_chunks
            .values()
            .filter(|c| c.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks.into_iter().skip(offset).take(limit).collect())
    }
}

fn matches_filters(chunk: &Chunk, filters: &[MetadataFilter]) -> bool {
    filters
        .iter()
        .all(|(field, value)| chunk.metadata.get(field).map(|v| v == value).unwrap_or(false))
}

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
    async fn test_create_and_search() {
        let store = HnswVectorStore::new(None).await.unwrap();
        store.create_collection("test", 3).await.unwrap();

        let chunks = vec![
            test_chunk("doc1", 0, vec![1.0, 0.0, 0.0]),
            test_chunk("doc2", 0, vec![0.0, 1.0, 0.0]),
        ];
        let count = store.upsert_chunks("test", &chunks).await.unwrap();
        assert_eq!(count, 2);

        let results = store
            .similarity_search("test", &[1.0, 0.1, 0.0], 10, 0.0, &[])
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].chunk.document_id, "doc1");
    }

    #[tokio::test]
    async fn test_upsert_rejects_dimension_mismatch() {
        let store = HnswVectorStore::new(None).await.unwrap();
        store.create_collection("test", 3).await.unwrap();

        let bad = test_chunk("doc1", 0, vec![1.0, 0.0]);
        assert!(store.upsert_chunks("test", &[bad]).await.is_err());
        assert_eq!(store.count_chunks("test", None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_by_document() {
        let store = HnswVectorStore::new(None).await.unwrap();
        store.create_collection("test", 3).await.unwrap();

        let chunks = vec![
            test_chunk("doc1", 0, vec![1.0, 0.0, 0.0]),
            test_chunk("doc1", 1, vec![0.0, 1.0, 0.0]),
            test_chunk("doc2", 0, vec![0.0, 0.0, 1.0]),
        ];
        store.upsert_chunks("test", &chunks).await.unwrap();

        let deleted = store.delete_by_document("test", "doc1").await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.count_chunks("test", None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_collection_operations() {
        let store = HnswVectorStore::new(None).await.unwrap();

        store.create_collection("col1", 128).await.unwrap();
        store.create_collection("col2", 256).await.unwrap();

        let collections = store.list_collections().await.unwrap();
        assert_eq!(collections.len(), 2);

        assert!(store.collection_exists("col1").await.unwrap());
        assert!(!store.collection_exists("col3").await.unwrap());

        store.delete_collection("col1").await.unwrap();
        assert!(!store.collection_exists("col1").await.unwrap());
    }
}
