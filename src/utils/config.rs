//! Environment-driven configuration (§6 "Environment configuration").
//!
//! Mirrors `llm::client::Provider::from_env` / `rag::embeddings::Provider::from_env`'s
//! one-shot, no-runtime-reconfiguration idiom: every knob is read once at
//! startup via [`RagConfig::from_env`] and passed down explicitly, rather
//! than read ad hoc from deep inside the pipeline. Provider *selection*
//! (which embedding/LLM/vector-store backend) stays on each provider's own
//! `from_env`; this struct only owns the pipeline-level knobs the spec
//! calls out directly.

use std::path::PathBuf;
use std::time::Duration;

use crate::rag::chunker::ChunkerConfig;
use crate::types::{AppError, Result};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AppError::Configuration(format!("{key} is not valid: {raw:?}"))),
        Err(_) => Ok(default),
    }
}

/// Bounds and retry parameters for the PDF downloader (C5), read from
/// `DOWNLOAD_*` environment variables.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Directory downloaded PDFs are persisted into.
    pub dir: PathBuf,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry attempts for transient failures.
    pub retries: u32,
    /// Bounded concurrency for batch downloads.
    pub concurrency: usize,
}

impl DownloadConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            dir: PathBuf::from(env_or("DOWNLOAD_DIR", "./data/documents")),
            timeout: Duration::from_millis(env_parse("DOWNLOAD_TIMEOUT_MS", 30_000)?),
            retries: env_parse("DOWNLOAD_RETRIES", 3)?,
            concurrency: env_parse("DOWNLOAD_CONCURRENCY", 3)?,
        })
    }
}

/// HTTP server bind address.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to bind to.
    pub port: u16,
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse("PORT", 3000)?,
        })
    }
}

/// Top-level configuration for the RAG core, assembled once at process
/// start from environment variables (§6) and never mutated at runtime.
#[derive(Debug, Clone)]
pub struct RagConfig {
    /// HTTP bind address.
    pub server: ServerConfig,
    /// Vector store collection all documents/chunks live in.
    pub collection: String,
    /// TTL applied to chat-cache entries (`CACHE_TTL_HOURS`, default 168h/7d).
    pub cache_ttl: Duration,
    /// Chunking parameters (`CHUNK_SIZE`/`CHUNK_MAX`/`CHUNK_OVERLAP`).
    pub chunker: ChunkerConfig,
    /// Minimum cosine similarity a retrieved chunk must clear (`SIMILARITY_THRESHOLD`).
    pub similarity_threshold: f32,
    /// Default number of chunks retrieved per query (`TOP_K_DEFAULT`).
    pub top_k_default: usize,
    /// PDF downloader configuration.
    pub download: DownloadConfig,
}

impl RagConfig {
    /// Read every knob from the environment, applying the §6 defaults.
    pub fn from_env() -> Result<Self> {
        let cache_ttl_hours: u64 = env_parse("CACHE_TTL_HOURS", 168)?;
        let target_tokens: usize = env_parse("CHUNK_SIZE", 400)?;
        let max_tokens: usize = env_parse("CHUNK_MAX", 600)?;
        let overlap_tokens: usize = env_parse("CHUNK_OVERLAP", 50)?;
        let similarity_threshold: f32 = env_parse("SIMILARITY_THRESHOLD", 0.35)?;
        let top_k_default: usize = env_parse("TOP_K_DEFAULT", 5)?;

        if max_tokens < target_tokens {
            return Err(AppError::Configuration(format!(
                "CHUNK_MAX ({max_tokens}) must be >= CHUNK_SIZE ({target_tokens})"
            )));
        }
        if !(0.0..=1.0).contains(&similarity_threshold) {
            return Err(AppError::Configuration(format!(
                "SIMILARITY_THRESHOLD must be in [0, 1], got {similarity_threshold}"
            )));
        }
        if top_k_default == 0 {
            return Err(AppError::Configuration(
                "TOP_K_DEFAULT must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            server: ServerConfig::from_env()?,
            collection: env_or("VECTOR_COLLECTION", "government_plans"),
            cache_ttl: Duration::from_secs(cache_ttl_hours * 3600),
            chunker: ChunkerConfig {
                target_tokens,
                max_tokens,
                overlap_tokens,
            },
            similarity_threshold,
            top_k_default,
            download: DownloadConfig::from_env()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn defaults_match_spec_section_6() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("CACHE_TTL_HOURS");
        std::env::remove_var("CHUNK_SIZE");
        std::env::remove_var("CHUNK_MAX");
        std::env::remove_var("SIMILARITY_THRESHOLD");
        std::env::remove_var("TOP_K_DEFAULT");

        let config = RagConfig::from_env().unwrap();
        assert_eq!(config.cache_ttl, Duration::from_secs(168 * 3600));
        assert_eq!(config.chunker.target_tokens, 400);
        assert_eq!(config.chunker.max_tokens, 600);
        assert_eq!(config.similarity_threshold, 0.35);
        assert_eq!(config.top_k_default, 5);
    }

    #[test]
    fn rejects_chunk_max_below_target() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("CHUNK_SIZE", "500");
        std::env::set_var("CHUNK_MAX", "100");
        let result = RagConfig::from_env();
        std::env::remove_var("CHUNK_SIZE");
        std::env::remove_var("CHUNK_MAX");
        assert!(result.is_err());
    }

    #[test]
    fn rejects_out_of_range_similarity_threshold() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("SIMILARITY_THRESHOLD", "1.5");
        let result = RagConfig::from_env();
        std::env::remove_var("SIMILARITY_THRESHOLD");
        assert!(result.is_err());
    }
}
