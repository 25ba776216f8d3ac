//! RAG pipeline (C14): orchestrates C10→C11→C12→C13 with cache
//! consultation and source attribution (§4.14).
//!
//! A single query is a linear, non-resumable flow: failure at any stage
//! terminates with a typed error, and partial results are never returned.
//! Concurrency lives across queries, not within one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::db::vectorstore::VectorStore;
use crate::db::DocumentStore;
use crate::rag::cache::{
    chat_params_hash, normalize_question, parties_hash, question_hash, topic_hash, CacheKey,
    ContentCache,
};
use crate::rag::context::{token_budget, ContextBuilder};
use crate::rag::embeddings::EmbeddingProvider;
use crate::rag::generate::ResponseGenerator;
use crate::rag::query_processor::QueryProcessor;
use crate::rag::search::SemanticSearcher;
use crate::types::{CacheEntry, Citation, ComparisonCacheEntry, ComparisonRow, PartyRegistry, Result};
use crate::types::{ChatResponse, ChatResponseMetadata, CompareResponse};

/// Default number of chunks retrieved per query (§6).
pub const DEFAULT_TOP_K: usize = 5;
/// Default minimum cosine similarity a chunk must clear (§6).
pub const DEFAULT_MIN_SCORE: f32 = 0.35;
/// Default cache TTL for user queries: 7 days (§4.14 step 9).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Expected output budget reserved when computing the context token budget
/// (matches the max_tokens the response generator requests, §4.13).
const EXPECTED_OUTPUT_TOKENS: u32 = 1_000;

/// The fixed response returned when retrieval finds nothing above
/// threshold (§4.14 step 5, §8 invariant 3/boundary 14).
const NO_INFO_ANSWER: &str = "No encontré información suficiente en los planes de gobierno \
ingeridos para responder esa pregunta.";

/// Options overriding a query's retrieval parameters; `None` fields fall
/// back to the pipeline's configured defaults.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    /// Restrict retrieval to one party, by slug. If unset and the query
    /// processor recognizes party entities, an implicit filter is applied
    /// (§4.14 step 3).
    pub party_filter: Option<String>,
    /// Maximum chunks to retrieve.
    pub top_k: Option<usize>,
    /// Minimum cosine similarity.
    pub min_score: Option<f32>,
}

/// Outcome of [`RagPipeline::query_streaming`]: either a cached answer
/// returned as-is (cache hit, topK=0, or no chunks retrieved), or a live
/// token stream plus its sources for the caller to relay as SSE frames.
pub enum StreamingQueryResult {
    /// Served from cache or short-circuited; no streaming occurs.
    Cached(ChatResponse),
    /// A live generation in progress.
    Live {
        /// Sources to emit as the `sources` SSE event.
        sources: Vec<Citation>,
        /// LLM model name, for the terminal `done` event's metadata.
        model: String,
        /// Incremental text deltas to emit as `token` SSE events.
        stream: crate::llm::TextDeltaStream,
    },
}

/// Wires the embedding, LLM, vector store, and cache dependencies a query
/// needs, and exposes the single [`RagPipeline::query`] entry point.
pub struct RagPipeline {
    embeddings: Arc<dyn EmbeddingProvider>,
    llm_client: Arc<dyn crate::llm::LLMClient>,
    searcher: SemanticSearcher,
    query_processor: QueryProcessor,
    generator: ResponseGenerator,
    documents: Arc<DocumentStore>,
    parties: Arc<RwLock<PartyRegistry>>,
    chat_cache: Arc<ContentCache<CacheEntry>>,
    comparison_cache: Arc<ContentCache<ComparisonCacheEntry>>,
    cache_ttl: Duration,
    default_top_k: usize,
    default_min_score: f32,
}

impl RagPipeline {
    /// Construct a pipeline. `llm_client` and `llm` (the latter used only
    /// for its human-readable name) are passed separately because
    /// [`crate::llm::LLMClient`] instances are built once via
    /// `Provider::create_client` and shared as a trait object.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        llm_client: Arc<dyn crate::llm::LLMClient>,
        store: Arc<dyn VectorStore>,
        collection: impl Into<String>,
        documents: Arc<DocumentStore>,
        parties: Arc<RwLock<PartyRegistry>>,
        chat_cache: Arc<ContentCache<CacheEntry>>,
        comparison_cache: Arc<ContentCache<ComparisonCacheEntry>>,
    ) -> Self {
        let searcher = SemanticSearcher::new(embeddings.clone(), store, collection);
        let query_processor = QueryProcessor::new(llm_client.clone());
        let generator = ResponseGenerator::new(llm_client.clone());
        Self {
            embeddings,
            llm_client,
            searcher,
            query_processor,
            generator,
            documents,
            parties,
            chat_cache,
            comparison_cache,
            cache_ttl: DEFAULT_CACHE_TTL,
            default_top_k: DEFAULT_TOP_K,
            default_min_score: DEFAULT_MIN_SCORE,
        }
    }

    /// Override the default cache TTL for user queries.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Override the default top-k and minimum score.
    pub fn with_retrieval_defaults(mut self, top_k: usize, min_score: f32) -> Self {
        self.default_top_k = top_k;
        self.default_min_score = min_score;
        self
    }

    /// Answer `question`, following §4.14's nine-step sequence.
    pub async fn query(&self, question: &str, options: QueryOptions) -> Result<ChatResponse> {
        let started = Instant::now();
        let top_k = options.top_k.unwrap_or(self.default_top_k);
        let min_score = options.min_score.unwrap_or(self.default_min_score);

        let cache_key = CacheKey {
            primary: question_hash(question),
            secondary: chat_params_hash(question, options.party_filter.as_deref(), top_k, min_score),
        };

        if let Some(entry) = self.chat_cache.get(&cache_key) {
            return Ok(cached_response(entry, started.elapsed().as_millis() as u64));
        }

        if top_k == 0 {
            // Edge case 14: topK = 0 skips retrieval outright, uncached.
            return Ok(no_info_response(started.elapsed().as_millis() as u64));
        }

        let enhanced = self.query_processor.process(question).await;

        let effective_party = options
            .party_filter
            .clone()
            .or_else(|| self.infer_party_from_entities(&enhanced.entities));

        let filters: Vec<(String, String)> = effective_party
            .as_ref()
            .map(|party| vec![("party_id".to_string(), party.clone())])
            .unwrap_or_default();

        let vector = self.embeddings.embed(&enhanced.enhanced_query).await?;
        let results = self.searcher.search_with_vector(&vector, top_k, min_score, &filters).await?;

        if results.is_empty() {
            info!(question = %normalize_question(question), "no chunks above threshold");
            return Ok(no_info_response(started.elapsed().as_millis() as u64));
        }
        let chunks_retrieved = results.len();

        let documents_snapshot: HashMap<String, crate::types::IngestedDocument> = self
            .documents
            .list(None)
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();
        let parties_guard = self.parties.read();
        let builder = ContextBuilder::new(&parties_guard, &documents_snapshot);
        let budget = token_budget(self.llm_client.context_window(), EXPECTED_OUTPUT_TOKENS);
        let (context, citations) = builder.build(&results, budget);
        drop(parties_guard);

        if context.trim().is_empty() {
            warn!("context budget left no room for any retrieved chunk");
            return Ok(no_info_response(started.elapsed().as_millis() as u64));
        }

        let generated = self.generator.generate(&context, question).await?;

        let metadata = ChatResponseMetadata {
            cached: false,
            model: self.llm_client.model_name().to_string(),
            tokens_used: Some(generated.usage.total()),
            processing_time_ms: started.elapsed().as_millis() as u64,
            chunks_retrieved,
            chunks_used: citations.len(),
        };

        let response = ChatResponse {
            answer: generated.content.clone(),
            sources: citations.clone(),
            confidence: generated.confidence,
            metadata: metadata.clone(),
        };

        let entry = CacheEntry {
            question_hash: cache_key.primary.clone(),
            params_hash: cache_key.secondary.clone(),
            question: question.to_string(),
            party_filter: effective_party,
            answer: generated.content,
            sources: citations,
            model: metadata.model.clone(),
            tokens_used: generated.usage.total(),
            computed_at: Utc::now(),
            expires_at: Some(Utc::now() + chrono::Duration::from_std(self.cache_ttl).unwrap_or_default()),
        };
        self.chat_cache.put(cache_key, entry, Some(self.cache_ttl));

        Ok(response)
    }

    /// Cache a precomputed entry with no expiration (admin-precomputed
    /// comparisons, §4.14 step 9).
    pub fn cache_without_expiry(&self, key: CacheKey, entry: CacheEntry) {
        self.chat_cache.put(key, entry, None);
    }

    /// Answer `question` for the streaming endpoint, following the same
    /// cache-check/retrieval/context steps as [`Self::query`], but handing
    /// back a live token stream instead of a collected answer on a cache
    /// miss. The caller is responsible for collecting the stream and, once
    /// complete, has everything needed to log/cache it if desired; this
    /// pipeline does not itself cache streamed answers (§6 `/chat/stream`
    /// is not specified as cache-writing).
    pub async fn query_streaming(&self, question: &str, options: QueryOptions) -> Result<StreamingQueryResult> {
        let top_k = options.top_k.unwrap_or(self.default_top_k);
        let min_score = options.min_score.unwrap_or(self.default_min_score);

        let cache_key = CacheKey {
            primary: question_hash(question),
            secondary: chat_params_hash(question, options.party_filter.as_deref(), top_k, min_score),
        };

        if let Some(entry) = self.chat_cache.get(&cache_key) {
            return Ok(StreamingQueryResult::Cached(cached_response(entry, 0)));
        }

        if top_k == 0 {
            return Ok(StreamingQueryResult::Cached(no_info_response(0)));
        }

        let enhanced = self.query_processor.process(question).await;

        let effective_party = options
            .party_filter
            .clone()
            .or_else(|| self.infer_party_from_entities(&enhanced.entities));

        let filters: Vec<(String, String)> = effective_party
            .as_ref()
            .map(|party| vec![("party_id".to_string(), party.clone())])
            .unwrap_or_default();

        let vector = self.embeddings.embed(&enhanced.enhanced_query).await?;
        let results = self.searcher.search_with_vector(&vector, top_k, min_score, &filters).await?;

        if results.is_empty() {
            return Ok(StreamingQueryResult::Cached(no_info_response(0)));
        }

        let documents_snapshot: HashMap<String, crate::types::IngestedDocument> = self
            .documents
            .list(None)
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();
        let parties_guard = self.parties.read();
        let builder = ContextBuilder::new(&parties_guard, &documents_snapshot);
        let budget = token_budget(self.llm_client.context_window(), EXPECTED_OUTPUT_TOKENS);
        let (context, citations) = builder.build(&results, budget);
        drop(parties_guard);

        if context.trim().is_empty() {
            return Ok(StreamingQueryResult::Cached(no_info_response(0)));
        }

        let stream = self.generator.generate_streaming(&context, question).await?;

        Ok(StreamingQueryResult::Live {
            sources: citations,
            model: self.llm_client.model_name().to_string(),
            stream,
        })
    }

    /// Compare `topic` across `parties` (or every known party if empty),
    /// one row per party, consulting and populating the comparison cache
    /// keyed by `(topic_hash, parties_hash)` (§4.4 Comparison Cache).
    ///
    /// Each row reuses the same C10-C13 machinery as [`Self::query`],
    /// scoped to one party via an explicit filter, rather than a separate
    /// comparison-specific pipeline.
    pub async fn compare(&self, topic: &str, parties: &[String], top_k: Option<usize>) -> Result<CompareResponse> {
        let started = Instant::now();

        let resolved_parties: Vec<String> = if parties.is_empty() {
            self.parties.read().list().iter().map(|p| p.slug.clone()).collect()
        } else {
            parties.to_vec()
        };

        let cache_key = CacheKey {
            primary: topic_hash(topic),
            secondary: parties_hash(&resolved_parties),
        };

        if let Some(entry) = self.comparison_cache.get(&cache_key) {
            return Ok(CompareResponse {
                topic: entry.topic,
                rows: entry.rows,
                metadata: ChatResponseMetadata {
                    cached: true,
                    model: entry.model,
                    tokens_used: None,
                    processing_time_ms: started.elapsed().as_millis() as u64,
                    chunks_retrieved: 0,
                    chunks_used: 0,
                },
            });
        }

        let top_k = top_k.unwrap_or(self.default_top_k);
        let mut rows = Vec::with_capacity(resolved_parties.len());
        let mut model = String::new();
        let mut total_tokens = 0u32;
        let mut chunks_retrieved = 0usize;
        let mut chunks_used = 0usize;

        for party in &resolved_parties {
            let options = QueryOptions {
                party_filter: Some(party.clone()),
                top_k: Some(top_k),
                min_score: None,
            };
            let response = self.query(topic, options).await?;
            chunks_retrieved += response.metadata.chunks_retrieved;
            chunks_used += response.metadata.chunks_used;
            total_tokens += response.metadata.tokens_used.unwrap_or(0);
            if !response.metadata.model.is_empty() {
                model = response.metadata.model.clone();
            }
            rows.push(ComparisonRow {
                party: party.clone(),
                answer: response.answer,
                sources: response.sources,
            });
        }

        let metadata = ChatResponseMetadata {
            cached: false,
            model: model.clone(),
            tokens_used: Some(total_tokens),
            processing_time_ms: started.elapsed().as_millis() as u64,
            chunks_retrieved,
            chunks_used,
        };

        let entry = ComparisonCacheEntry {
            topic_hash: cache_key.primary.clone(),
            parties_hash: cache_key.secondary.clone(),
            topic: topic.to_string(),
            parties: resolved_parties,
            rows: rows.clone(),
            model,
            computed_at: Utc::now(),
            expires_at: None,
        };
        self.comparison_cache.put(cache_key, entry, None);

        Ok(CompareResponse {
            topic: topic.to_string(),
            rows,
            metadata,
        })
    }

    /// Match recognized entities against known party slugs/abbreviations
    /// (case-insensitive); returns the first match (§4.14 step 3).
    fn infer_party_from_entities(&self, entities: &[String]) -> Option<String> {
        let parties = self.parties.read();
        for entity in entities {
            let needle = entity.to_lowercase();
            for party in parties.list() {
                if party.slug.to_lowercase() == needle || party.abbreviation.to_lowercase() == needle {
                    return Some(party.slug.clone());
                }
            }
        }
        None
    }
}

fn no_info_response(processing_time_ms: u64) -> ChatResponse {
    ChatResponse {
        answer: NO_INFO_ANSWER.to_string(),
        sources: Vec::new(),
        confidence: 0.0,
        metadata: ChatResponseMetadata {
            cached: false,
            model: String::new(),
            tokens_used: None,
            processing_time_ms,
            chunks_retrieved: 0,
            chunks_used: 0,
        },
    }
}

fn cached_response(entry: CacheEntry, processing_time_ms: u64) -> ChatResponse {
    ChatResponse {
        answer: entry.answer,
        sources: entry.sources,
        confidence: 1.0,
        metadata: ChatResponseMetadata {
            cached: true,
            model: entry.model,
            tokens_used: None,
            processing_time_ms,
            chunks_retrieved: 0,
            chunks_used: 0,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::vectorstore::InMemoryVectorStore;
    use crate::types::{AppError, Chunk, Party, QualityBreakdown};
    use async_trait::async_trait;
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
            "stub-embed"
        }
    }

    struct StubLlm;

    #[async_trait]
    impl crate::llm::LLMClient for StubLlm {
        async fn complete(
            &self,
            _messages: &[crate::llm::ChatMessage],
            _options: &crate::llm::CompletionOptions,
        ) -> Result<crate::llm::LLMResponse> {
            Ok(crate::llm::LLMResponse {
                content: "El PLN propone mejorar la educación pública en todo el país.".to_string(),
                usage: crate::llm::TokenUsage { prompt_tokens: 50, completion_tokens: 20 },
                finish_reason: crate::llm::FinishReason::Stop,
            })
        }
        async fn stream(
            &self,
            _messages: &[crate::llm::ChatMessage],
            _options: &crate::llm::CompletionOptions,
        ) -> Result<crate::llm::TextDeltaStream> {
            Err(AppError::Internal("streaming not used in this test".into()))
        }
        fn context_window(&self) -> u32 {
            8192
        }
        fn model_name(&self) -> &str {
            "stub-llm"
        }
    }

    fn make_chunk(document_id: &str) -> Chunk {
        Chunk {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            chunk_index: 0,
            content: "El plan propone mejorar la educación pública en todo el país.".to_string(),
            embedding: Some(vec![1.0, 0.0, 0.0]),
            token_count: 12,
            char_count: 60,
            page_range: None,
            quality_score: 0.8,
            quality_breakdown: QualityBreakdown::default(),
            keywords: vec![],
            entities: vec![],
            created_at: Utc::now(),
            metadata: Default::default(),
        }
    }

    async fn build_pipeline() -> (RagPipeline, Arc<DocumentStore>) {
        let store = Arc::new(InMemoryVectorStore::new());
        store.create_collection("docs", 3).await.unwrap();
        store.upsert_chunks("docs", &[make_chunk("doc1")]).await.unwrap();

        let documents = Arc::new(DocumentStore::new());
        documents.upsert(crate::types::IngestedDocument {
            id: "doc1".to_string(),
            party_id: "pln".to_string(),
            source_url: "https://example.test/plan.pdf".to_string(),
            local_path: "/tmp/plan.pdf".to_string(),
            page_count: 10,
            byte_size: 100,
            downloaded_at: Utc::now(),
            parsed_at: Some(Utc::now()),
            metadata: [("title".to_string(), "Plan de Gobierno".to_string())].into_iter().collect(),
        });

        let mut registry = PartyRegistry::new();
        registry.upsert(Party {
            slug: "pln".to_string(),
            name: "Partido Liberación Nacional".to_string(),
            abbreviation: "PLN".to_string(),
            color: None,
            metadata: Default::default(),
        });
        let parties = Arc::new(RwLock::new(registry));

        let pipeline = RagPipeline::new(
            Arc::new(StubEmbeddings),
            Arc::new(StubLlm),
            store,
            "docs",
            documents.clone(),
            parties,
            Arc::new(ContentCache::new()),
            Arc::new(ContentCache::new()),
        );
        (pipeline, documents)
    }

    #[tokio::test]
    async fn query_returns_no_info_response_on_empty_corpus() {
        let store = Arc::new(InMemoryVectorStore::new());
        store.create_collection("docs", 3).await.unwrap();
        let pipeline = RagPipeline::new(
            Arc::new(StubEmbeddings),
            Arc::new(StubLlm),
            store,
            "docs",
            Arc::new(DocumentStore::new()),
            Arc::new(RwLock::new(PartyRegistry::new())),
            Arc::new(ContentCache::new()),
            Arc::new(ContentCache::new()),
        );
        let response = pipeline.query("¿Qué proponen sobre salud?", QueryOptions::default()).await.unwrap();
        assert_eq!(response.confidence, 0.0);
        assert!(response.sources.is_empty());
        assert!(!response.metadata.cached);
    }

    #[tokio::test]
    async fn query_with_top_k_zero_skips_retrieval() {
        let (pipeline, _documents) = build_pipeline().await;
        let options = QueryOptions { top_k: Some(0), ..Default::default() };
        let response = pipeline.query("¿Qué proponen?", options).await.unwrap();
        assert_eq!(response.confidence, 0.0);
        assert_eq!(response.metadata.chunks_retrieved, 0);
    }

    #[tokio::test]
    async fn repeated_identical_query_is_served_from_cache() {
        let (pipeline, _documents) = build_pipeline().await;
        let question = "¿Qué propone el PLN sobre educación?";

        let first = pipeline.query(question, QueryOptions::default()).await.unwrap();
        assert!(!first.metadata.cached);

        let second = pipeline.query(question, QueryOptions::default()).await.unwrap();
        assert!(second.metadata.cached);
        assert_eq!(second.answer, first.answer);
    }

    #[tokio::test]
    async fn repeated_comparison_is_served_from_comparison_cache() {
        let (pipeline, _documents) = build_pipeline().await;
        let topic = "educación";
        let parties = vec!["pln".to_string()];

        let first = pipeline.compare(topic, &parties, None).await.unwrap();
        assert!(!first.metadata.cached);
        assert_eq!(first.rows.len(), 1);
        assert_eq!(first.rows[0].party, "pln");

        let second = pipeline.compare(topic, &parties, None).await.unwrap();
        assert!(second.metadata.cached);
        assert_eq!(second.rows, first.rows);
    }

    #[tokio::test]
    async fn comparison_defaults_to_all_known_parties_when_none_given() {
        let (pipeline, _documents) = build_pipeline().await;
        let response = pipeline.compare("seguridad", &[], None).await.unwrap();
        assert_eq!(response.rows.len(), 1);
    }
}
