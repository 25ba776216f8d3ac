//! `ticobot-rag-server` binary.
//!
//! Wires the environment-driven configuration, the three providers
//! (embedding, LLM, vector store), the ingestion and query pipelines, and
//! the HTTP layer together, then serves. For library usage, depend on
//! `ticobot_rag` directly instead of this binary.

use std::sync::Arc;

use axum::Router;
use parking_lot::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use utoipa::OpenApi;

use ticobot_rag::db::vectorstore::VectorStoreProvider;
use ticobot_rag::db::DocumentStore;
use ticobot_rag::rag::cache::ContentCache;
use ticobot_rag::rag::chunker::TextChunker;
use ticobot_rag::rag::embeddings;
use ticobot_rag::rag::ingest::download::Downloader;
use ticobot_rag::rag::ingest::pipeline::IngestionPipeline;
use ticobot_rag::types::{CacheEntry, ComparisonCacheEntry, PartyRegistry};
use ticobot_rag::utils::{RagConfig, TunablesManager};
use ticobot_rag::{api, llm, AppState, RagPipeline};

/// Optional path to a TOML file of hot-reloadable retrieval tunables
/// (similarity threshold, quality drop threshold, default top-k). Absent
/// a file here, built-in defaults apply and can still be changed by
/// restarting with `TUNABLES_FILE` set.
const TUNABLES_FILE_ENV: &str = "TUNABLES_FILE";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting ticobot-rag");

    let config = RagConfig::from_env()?;
    tracing::info!(
        collection = %config.collection,
        chunk_target = config.chunker.target_tokens,
        "configuration loaded"
    );

    // =================================================================
    // Providers (C1-C3)
    // =================================================================
    let embedding_provider = embeddings::Provider::from_env()?;
    let embeddings_client: Arc<dyn embeddings::EmbeddingProvider> =
        Arc::from(embedding_provider.create_client()?);
    tracing::info!(model = %embeddings_client.model_name(), "embedding provider ready");

    let llm_provider = llm::Provider::from_env()?;
    let llm_client: Arc<dyn llm::LLMClient> = Arc::from(llm_provider.create_client().await?);
    tracing::info!(provider = llm_provider.name(), "LLM provider ready");

    let vector_store_provider = VectorStoreProvider::from_env();
    let vector_store: Arc<dyn ticobot_rag::db::VectorStore> =
        Arc::from(vector_store_provider.create_store().await?);
    if !vector_store.collection_exists(&config.collection).await? {
        vector_store
            .create_collection(&config.collection, embeddings_client.dimension())
            .await?;
        tracing::info!(collection = %config.collection, "vector store collection created");
    }
    tracing::info!(provider = vector_store.provider_name(), "vector store ready");

    // =================================================================
    // Metadata, caches, tunables
    // =================================================================
    let documents = Arc::new(DocumentStore::new());
    let parties = Arc::new(RwLock::new(PartyRegistry::new()));
    let chat_cache: Arc<ContentCache<CacheEntry>> = Arc::new(ContentCache::new());
    let comparison_cache: Arc<ContentCache<ComparisonCacheEntry>> = Arc::new(ContentCache::new());

    let tunables = match std::env::var(TUNABLES_FILE_ENV) {
        Ok(path) => {
            let manager = TunablesManager::load_or_default(&path);
            if let Err(e) = manager.start_watching() {
                tracing::warn!("tunables hot-reload disabled: {e}");
            }
            manager
        }
        Err(_) => TunablesManager::in_memory(Default::default()),
    };
    let tunables = Arc::new(tunables);

    // =================================================================
    // Pipelines (C5-C14)
    // =================================================================
    let downloader = Arc::new(
        Downloader::new(config.download.dir.clone())?
            .with_timeout(config.download.timeout)
            .with_max_attempts(config.download.retries)
            .with_concurrency(config.download.concurrency),
    );
    let chunker = TextChunker::new(config.chunker.clone());

    let ingestion = Arc::new(IngestionPipeline {
        downloader,
        chunker,
        embeddings: embeddings_client.clone(),
        store: vector_store.clone(),
        documents: documents.clone(),
    });

    let pipeline = Arc::new(
        RagPipeline::new(
            embeddings_client.clone(),
            llm_client.clone(),
            vector_store.clone(),
            config.collection.clone(),
            documents.clone(),
            parties.clone(),
            chat_cache,
            comparison_cache,
        )
        .with_cache_ttl(config.cache_ttl)
        .with_retrieval_defaults(config.top_k_default, config.similarity_threshold),
    );

    let state = AppState {
        pipeline,
        ingestion,
        vector_store,
        documents,
        parties,
        collection: config.collection.clone(),
        tunables,
        llm_provider_name: llm_provider.name().to_string(),
        embedding_provider_name: embeddings_client.model_name().to_string(),
    };

    // =================================================================
    // OpenAPI documentation
    // =================================================================
    #[derive(OpenApi)]
    #[openapi(
        paths(
            ticobot_rag::api::handlers::chat::chat,
            ticobot_rag::api::handlers::chat::chat_stream,
            ticobot_rag::api::handlers::compare::compare,
            ticobot_rag::api::handlers::parties::list_parties,
            ticobot_rag::api::handlers::parties::get_party,
            ticobot_rag::api::handlers::documents::list_documents,
            ticobot_rag::api::handlers::documents::list_document_chunks,
            ticobot_rag::api::handlers::ingest::ingest,
            ticobot_rag::api::handlers::ingest::ingest_batch,
            ticobot_rag::api::handlers::health::health,
        ),
        components(schemas(
            ticobot_rag::types::ChatRequest,
            ticobot_rag::types::ChatResponse,
            ticobot_rag::types::ChatResponseMetadata,
            ticobot_rag::types::Citation,
            ticobot_rag::types::CompareRequest,
            ticobot_rag::types::CompareResponse,
            ticobot_rag::types::ComparisonRow,
            ticobot_rag::types::Party,
            ticobot_rag::types::PartySummary,
            ticobot_rag::types::DocumentSummary,
            ticobot_rag::types::Chunk,
            ticobot_rag::types::IngestRequest,
            ticobot_rag::types::IngestBatchRequest,
            ticobot_rag::types::IngestResult,
            ticobot_rag::types::IngestBatchResponse,
            ticobot_rag::types::HealthResponse,
        )),
        tags(
            (name = "chat", description = "Question answering against ingested government plans"),
            (name = "compare", description = "Cross-party topic comparison"),
            (name = "parties", description = "Known political parties"),
            (name = "documents", description = "Ingested document metadata (admin)"),
            (name = "ingest", description = "Document ingestion (admin)"),
            (name = "health", description = "Liveness and diagnostics"),
        ),
        info(
            title = "ticobot-rag API",
            version = "0.1.0",
            description = "RAG backend for comparing Costa Rican political party government plans"
        )
    )]
    struct ApiDoc;

    // =================================================================
    // Router
    // =================================================================
    #[allow(unused_mut)]
    let mut app = Router::new()
        .nest("/api", api::routes::create_router())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    #[cfg(feature = "swagger-ui")]
    {
        app = app.merge(
            utoipa_swagger_ui::SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()),
        );
    }
    #[cfg(not(feature = "swagger-ui"))]
    let _ = ApiDoc::openapi();

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("ticobot-rag listening on http://{addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
