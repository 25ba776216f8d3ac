//! Semantic searcher (C11).
//!
//! Trimmed from the teacher's multi-strategy engine (semantic + BM25 +
//! fuzzy + hybrid, fused via reciprocal rank fusion) down to the single
//! strategy this spec calls for: embed the query, delegate to the vector
//! store's own threshold-plus-k protocol, return what it ranks. The
//! teacher's RRF idea isn't lost — an optional keyword-overlap rerank
//! signal lives in [`crate::rag::context`] instead, where it can combine
//! with deduplication and ordering.

use std::sync::Arc;

use crate::db::vectorstore::{MetadataFilter, VectorStore};
use crate::rag::embeddings::EmbeddingProvider;
use crate::types::{Result, SearchQuery, SearchResult};

/// Embeds a query and retrieves the top matching chunks from one
/// collection via a [`VectorStore`].
pub struct SemanticSearcher {
    embeddings: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    collection: String,
}

impl SemanticSearcher {
    /// Construct a searcher over `collection`, using `embeddings` to embed
    /// queries and `store` to rank chunks.
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            embeddings,
            store,
            collection: collection.into(),
        }
    }

    /// Run `query`, embedding its text and delegating ranking to the
    /// vector store's threshold-plus-k protocol (§4.3).
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        let vector = self.embeddings.embed(&query.query).await?;
        let filters: Vec<MetadataFilter> = query
            .filters
            .as_ref()
            .map(|fs| fs.iter().map(|f| (f.field.clone(), f.value.clone())).collect())
            .unwrap_or_default();

        self.store
            .similarity_search(&self.collection, &vector, query.limit, query.threshold, &filters)
            .await
    }

    /// Run a search with an already-computed embedding, skipping the
    /// embedding call (used when the caller already embedded an enhanced
    /// query upstream, e.g. the pipeline reusing C10's output).
    pub async fn search_with_vector(
        &self,
        vector: &[f32],
        limit: usize,
        threshold: f32,
        filters: &[MetadataFilter],
    ) -> Result<Vec<SearchResult>> {
        self.store
            .similarity_search(&self.collection, vector, limit, threshold, filters)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::vectorstore::InMemoryVectorStore;
    use crate::types::Chunk;
    use async_trait::async_trait;
    use chrono::Utc;
    use uuid::Uuid;

    struct StubEmbeddings;

    #[async_trait]
    impl EmbeddingProvider for StubEmbeddings {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
        }
        fn dimension(&self) -> usize {
            3
        }
        fn model_name(&self) -> &str {
            "stub"
        }
    }

    fn make_chunk(document_id: &str, index: usize, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            chunk_index: index,
            content: format!("contenido {index}"),
            embedding: Some(embedding),
            token_count: 10,
            char_count: 50,
            page_range: None,
            quality_score: 0.8,
            quality_breakdown: Default::default(),
            keywords: vec![],
            entities: vec![],
            created_at: Utc::now(),
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn search_embeds_query_and_delegates_to_store() {
        let store = Arc::new(InMemoryVectorStore::new());
        store.create_collection("docs", 3).await.unwrap();
        store
            .upsert_chunks("docs", &[make_chunk("doc1", 0, vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();

        let searcher = SemanticSearcher::new(Arc::new(StubEmbeddings), store, "docs");
        let query = SearchQuery {
            query: "pregunta".to_string(),
            limit: 5,
            threshold: 0.1,
            filters: None,
        };
        let results = searcher.search(&query).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}
