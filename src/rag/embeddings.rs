//! Embedding provider abstraction (C1).
//!
//! Every provider implements [`EmbeddingProvider`]: `embed`/`embed_batch`
//! preserve order and batch transparently under the provider's limit;
//! `dimension`/`model_name` are stable for the provider's lifetime.
//! Selection is config-driven via `EMBEDDING_PROVIDER`, mirroring the
//! `llm::client::Provider` enum + factory pattern.

use crate::types::{AppError, Result};
use async_trait::async_trait;

/// Capability trait every embedding provider implements (C1).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text. Fails with `ProviderUnavailable` on transport error.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.embed_batch(&[text.to_string()]).await?;
        batch
            .pop()
            .ok_or_else(|| AppError::Internal("embedding provider returned no vectors".into()))
    }

    /// Embed a batch, preserving order. Providers split into sub-requests
    /// under their own limit transparently and concatenate results.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Declared output dimension `D`, stable for this provider's lifetime.
    fn dimension(&self) -> usize;

    /// Provider-reported model identifier.
    fn model_name(&self) -> &str;
}

/// Config-driven provider selection: one value constructed at startup,
/// no runtime reconfiguration, exactly as `llm::client::Provider` does.
#[derive(Debug, Clone)]
pub enum Provider {
    /// OpenAI-compatible HTTP embeddings endpoint.
    OpenAI {
        /// API key.
        api_key: String,
        /// Base URL, e.g. `https://api.openai.com/v1`.
        api_base: String,
        /// Model identifier, e.g. `text-embedding-3-small`.
        model: String,
        /// Declared output dimension.
        dimension: usize,
    },
    /// Local ONNX model via `fastembed`.
    Local {
        /// Which local model to load.
        model: LocalModel,
    },
}

/// Locally-hosted embedding models supported via `fastembed`. A small,
/// curated subset — the Spanish-language corpus this system serves needs
/// multilingual coverage, not the teacher's full 30+ model catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalModel {
    /// intfloat/multilingual-e5-small — 384 dimensions, fast default.
    #[default]
    MultilingualE5Small,
    /// intfloat/multilingual-e5-base — 768 dimensions, better recall.
    MultilingualE5Base,
    /// intfloat/multilingual-e5-large — 1024 dimensions.
    MultilingualE5Large,
}

impl LocalModel {
    #[cfg(feature = "local-embeddings")]
    fn to_fastembed(self) -> fastembed::EmbeddingModel {
        match self {
            LocalModel::MultilingualE5Small => fastembed::EmbeddingModel::MultilingualE5Small,
            LocalModel::MultilingualE5Base => fastembed::EmbeddingModel::MultilingualE5Base,
            LocalModel::MultilingualE5Large => fastembed::EmbeddingModel::MultilingualE5Large,
        }
    }

    /// Declared output dimension.
    pub fn dimension(self) -> usize {
        match self {
            LocalModel::MultilingualE5Small => 384,
            LocalModel::MultilingualE5Base => 768,
            LocalModel::MultilingualE5Large => 1024,
        }
    }

    /// Human-readable model name.
    pub fn name(self) -> &'static str {
        match self {
            LocalModel::MultilingualE5Small => "intfloat/multilingual-e5-small",
            LocalModel::MultilingualE5Base => "intfloat/multilingual-e5-base",
            LocalModel::MultilingualE5Large => "intfloat/multilingual-e5-large",
        }
    }
}

impl Provider {
    /// Construct the concrete client for this provider.
    pub fn create_client(&self) -> Result<Box<dyn EmbeddingProvider>> {
        match self {
            #[cfg(feature = "openai")]
            Provider::OpenAI {
                api_key,
                api_base,
                model,
                dimension,
            } => Ok(Box::new(OpenAIEmbeddingProvider::new(
                api_key.clone(),
                api_base.clone(),
                model.clone(),
                *dimension,
            ))),
            #[cfg(not(feature = "openai"))]
            Provider::OpenAI { .. } => Err(AppError::Configuration(
                "OpenAI embedding provider selected but the `openai` feature is disabled".into(),
            )),

            #[cfg(feature = "local-embeddings")]
            Provider::Local { model } => Ok(Box::new(LocalEmbeddingProvider::new(*model)?)),
            #[cfg(not(feature = "local-embeddings"))]
            Provider::Local { .. } => Err(AppError::Configuration(
                "Local embedding provider selected but the `local-embeddings` feature is disabled"
                    .into(),
            )),
        }
    }

    /// Build a provider from `EMBEDDING_PROVIDER` + friends (see spec §6).
    pub fn from_env() -> Result<Self> {
        let kind = std::env::var("EMBEDDING_PROVIDER").unwrap_or_else(|_| "local".to_string());
        match kind.as_str() {
            "openai" => Ok(Provider::OpenAI {
                api_key: std::env::var("OPENAI_API_KEY").map_err(|_| {
                    AppError::Configuration(
                        "OPENAI_API_KEY is required for EMBEDDING_PROVIDER=openai".into(),
                    )
                })?,
                api_base: std::env::var("OPENAI_API_BASE")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                model: std::env::var("OPENAI_EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
                dimension: std::env::var("OPENAI_EMBEDDING_DIMENSION")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1536),
            }),
            "local" => Ok(Provider::Local {
                model: LocalModel::default(),
            }),
            other => Err(AppError::Configuration(format!(
                "Unknown EMBEDDING_PROVIDER '{}'; expected 'openai' or 'local'",
                other
            ))),
        }
    }
}

/// OpenAI-compatible HTTP embeddings client. Mirrors `llm::openai`'s
/// request-builder idiom, against the embeddings endpoint instead of chat.
#[cfg(feature = "openai")]
pub struct OpenAIEmbeddingProvider {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    dimension: usize,
}

#[cfg(feature = "openai")]
impl OpenAIEmbeddingProvider {
    /// Construct a client against `api_base` with `api_key`.
    pub fn new(api_key: String, api_base: String, model: String, dimension: usize) -> Self {
        let config = async_openai::config::OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);
        Self {
            client: async_openai::Client::with_config(config),
            model,
            dimension,
        }
    }

    /// The provider's own batch-size ceiling; larger requests are split.
    const MAX_BATCH: usize = 2048;
}

#[cfg(feature = "openai")]
#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(Self::MAX_BATCH) {
            let request = async_openai::types::CreateEmbeddingRequestArgs::default()
                .model(&self.model)
                .input(batch.to_vec())
                .build()
                .map_err(|e| AppError::ProviderUnavailable(format!("build request: {e}")))?;

            let response = self.client.embeddings().create(request).await.map_err(|e| {
                AppError::ProviderUnavailable(format!("OpenAI embeddings call failed: {e}"))
            })?;

            let mut vectors: Vec<(usize, Vec<f32>)> = response
                .data
                .into_iter()
                .map(|d| (d.index as usize, d.embedding))
                .collect();
            vectors.sort_by_key(|(idx, _)| *idx);
            out.extend(vectors.into_iter().map(|(_, v)| v));
        }

        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Local ONNX embedding client via `fastembed`. `TextEmbedding::embed` is
/// synchronous and CPU-bound, so calls run on `spawn_blocking` to avoid
/// stalling the async runtime.
#[cfg(feature = "local-embeddings")]
pub struct LocalEmbeddingProvider {
    model: std::sync::Arc<parking_lot::Mutex<fastembed::TextEmbedding>>,
    dimension: usize,
    name: &'static str,
}

#[cfg(feature = "local-embeddings")]
impl LocalEmbeddingProvider {
    /// Load `model`, downloading weights on first use if not cached.
    pub fn new(model: LocalModel) -> Result<Self> {
        let inner = fastembed::TextEmbedding::try_new(
            fastembed::InitOptions::new(model.to_fastembed()).with_show_download_progress(true),
        )
        .map_err(|e| AppError::Configuration(format!("failed to load embedding model: {e}")))?;

        Ok(Self {
            model: std::sync::Arc::new(parking_lot::Mutex::new(inner)),
            dimension: model.dimension(),
            name: model.name(),
        })
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.model.clone();
        let owned: Vec<String> = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = owned.iter().map(|s| s.as_str()).collect();
            model
                .lock()
                .embed(refs, None)
                .map_err(|e| AppError::Internal(format!("local embedding failed: {e}")))
        })
        .await
        .map_err(|e| AppError::Internal(format!("blocking task failed: {e}")))?
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubProvider {
        dim: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for StubProvider {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0; self.dim]).collect())
        }

        fn dimension(&self) -> usize {
            self.dim
        }

        fn model_name(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn embed_delegates_to_embed_batch() {
        let provider = StubProvider { dim: 3 };
        let vector = provider.embed("hola").await.unwrap();
        assert_eq!(vector.len(), 3);
    }

    #[test]
    fn local_model_dimensions_match_declared_values() {
        assert_eq!(LocalModel::MultilingualE5Small.dimension(), 384);
        assert_eq!(LocalModel::MultilingualE5Base.dimension(), 768);
        assert_eq!(LocalModel::MultilingualE5Large.dimension(), 1024);
    }
}
