//! Ingestion pipeline (C9): orchestrates download → extract → chunk →
//! score → embed → persist for one document or a batch.
//!
//! Per §9/§10's "stateless pipeline function" guidance, `ingest`/
//! `ingest_batch` are free functions parameterized by the provider/store
//! values the caller already owns, not a long-lived orchestrator struct —
//! the same shape `rag::mod`'s module doc describes the ingestion flow
//! with, rather than a persistent coordinator object.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::vectorstore::VectorStore;
use crate::db::DocumentStore;
use crate::rag::chunker::TextChunker;
use crate::rag::embeddings::EmbeddingProvider;
use crate::rag::ingest::download::Downloader;
use crate::rag::ingest::extract::extract_and_clean;
use crate::rag::quality;
use crate::types::{
    Chunk, IngestRequest, IngestResult, IngestStats, IngestStatus, IngestedDocument,
};

/// Embedding sub-batch size; retried up to 3 times on transient failure
/// before the whole document is marked partial-failed (§4.9 step 5).
const EMBED_BATCH_SIZE: usize = 100;
const EMBED_MAX_RETRIES: u32 = 3;

/// Per-run ingestion parameters.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Vector store collection to persist chunks into.
    pub collection: String,
}

/// Dependencies one ingestion call needs, bundled so the free functions
/// stay parameterized rather than reaching into global state.
pub struct IngestionPipeline {
    /// Downloads PDF bytes (C5).
    pub downloader: Arc<Downloader>,
    /// Chunks cleaned text (C7).
    pub chunker: TextChunker,
    /// Embeds chunk content (C1).
    pub embeddings: Arc<dyn EmbeddingProvider>,
    /// Persists chunks (C3).
    pub store: Arc<dyn VectorStore>,
    /// Persists document metadata.
    pub documents: Arc<DocumentStore>,
}

impl IngestionPipeline {
    /// Ingest one document end to end (§4.9).
    pub async fn ingest(&self, request: &IngestRequest, options: &IngestOptions) -> IngestResult {
        ingest(self, request, options).await
    }

    /// Ingest a batch sequentially, one document's failure not aborting
    /// the rest (§4.9).
    pub async fn ingest_batch(&self, requests: &[IngestRequest], options: &IngestOptions) -> Vec<IngestResult> {
        ingest_batch(self, requests, options).await
    }
}

/// Ingest one document (§4.9 stages 1-6).
pub async fn ingest(pipeline: &IngestionPipeline, request: &IngestRequest, options: &IngestOptions) -> IngestResult {
    let mut stats = IngestStats::default();

    let t_download = Instant::now();
    let download = pipeline.downloader.download(&request.url, &request.doc_id).await;
    stats.download_ms = t_download.elapsed().as_millis() as u64;

    let local_path = match (download.local_path, download.error) {
        (Some(path), None) => path,
        (_, Some(err)) => {
            warn!(doc_id = %request.doc_id, ?err, "download failed");
            return failed(request, stats, format!("download failed: {err}"));
        }
        (None, None) => {
            return failed(request, stats, "download produced no path".to_string());
        }
    };

    let bytes = match tokio::fs::read(&local_path).await {
        Ok(b) => b,
        Err(e) => return failed(request, stats, format!("failed to read downloaded file: {e}")),
    };

    let t_parse = Instant::now();
    let extracted = match extract_and_clean(&bytes) {
        Ok(e) => e,
        Err(e) => {
            error!(doc_id = %request.doc_id, error = %e, "parse failed");
            return failed(request, stats, format!("parse failed: {e}"));
        }
    };
    stats.parse_ms = t_parse.elapsed().as_millis() as u64;
    stats.clean_ms = 0; // cleaning happens inside extract_and_clean, counted with parse

    let t_chunk = Instant::now();
    let drafts = pipeline.chunker.chunk(&extracted.text, &extracted.pages);
    stats.chunk_ms = t_chunk.elapsed().as_millis() as u64;

    let target_tokens = pipeline.chunker.config().target_tokens;
    let mut eligible: Vec<(crate::rag::chunker::ChunkDraft, f32)> = drafts
        .into_iter()
        .map(|d| {
            let score = quality::overall_quality(&d.content, target_tokens);
            (d, score)
        })
        .filter(|(d, score)| {
            if *score < quality::DROP_THRESHOLD {
                info!(doc_id = %request.doc_id, chunk_index = d.index, score, "dropping low-quality chunk");
                false
            } else {
                true
            }
        })
        .collect();
    eligible.sort_by_key(|(d, _)| d.index);

    if eligible.is_empty() {
        pipeline.documents.upsert(document_record(request, &extracted, &local_path, &bytes));
        return IngestResult {
            doc_id: request.doc_id.clone(),
            status: IngestStatus::Partial,
            error: Some("all chunks were below the quality threshold".to_string()),
            chunk_count: 0,
            avg_tokens: 0.0,
            stats,
        };
    }

    let t_embed = Instant::now();
    let contents: Vec<String> = eligible.iter().map(|(d, _)| d.content.clone()).collect();
    let embeddings = match embed_with_retry(pipeline.embeddings.as_ref(), &contents).await {
        Ok(vectors) => vectors,
        Err(e) => {
            error!(doc_id = %request.doc_id, error = %e, "embedding failed after retries");
            return failed(request, stats, format!("embedding failed: {e}"));
        }
    };
    stats.embed_ms = t_embed.elapsed().as_millis() as u64;

    let now = Utc::now();
    let chunks: Vec<Chunk> = eligible
        .into_iter()
        .zip(embeddings.into_iter())
        .map(|((draft, score), embedding)| {
            let keywords = quality::extract_keywords(&draft.content, 10);
            let entities = quality::extract_entities(&draft.content);
            let quality_breakdown = quality::score(&draft.content, target_tokens);
            let mut metadata = std::collections::HashMap::new();
            metadata.insert("party_id".to_string(), request.party_id.clone());
            Chunk {
                id: Uuid::new_v4().to_string(),
                document_id: request.doc_id.clone(),
                chunk_index: draft.index,
                content: draft.content,
                embedding: Some(embedding),
                token_count: draft.token_count,
                char_count: draft.end_offset.saturating_sub(draft.start_offset),
                page_range: draft.page_range.or_else(|| draft.page_number.map(|p| crate::types::PageRange { start: p, end: p })),
                quality_score: score,
                quality_breakdown,
                keywords,
                entities,
                created_at: now,
                metadata,
            }
        })
        .collect();

    let t_persist = Instant::now();
    // Re-ingestion: delete existing chunks for this document before insert (§4.9).
    if let Err(e) = pipeline.store.delete_by_document(&options.collection, &request.doc_id).await {
        warn!(doc_id = %request.doc_id, error = %e, "failed to clear prior chunks before re-ingestion");
    }
    if let Err(e) = pipeline.store.upsert_chunks(&options.collection, &chunks).await {
        error!(doc_id = %request.doc_id, error = %e, "persistence failed");
        return failed(request, stats, format!("persistence failed: {e}"));
    }
    stats.persist_ms = t_persist.elapsed().as_millis() as u64;

    pipeline.documents.upsert(document_record(request, &extracted, &local_path, &bytes));

    let avg_tokens = if chunks.is_empty() {
        0.0
    } else {
        chunks.iter().map(|c| c.token_count).sum::<usize>() as f32 / chunks.len() as f32
    };

    IngestResult {
        doc_id: request.doc_id.clone(),
        status: IngestStatus::Success,
        error: None,
        chunk_count: chunks.len(),
        avg_tokens,
        stats,
    }
}

/// Ingest a batch sequentially: one document's failure does not abort the
/// rest (§4.9).
pub async fn ingest_batch(
    pipeline: &IngestionPipeline,
    requests: &[IngestRequest],
    options: &IngestOptions,
) -> Vec<IngestResult> {
    let mut results = Vec::with_capacity(requests.len());
    for request in requests {
        results.push(ingest(pipeline, request, options).await);
    }
    results
}

fn failed(request: &IngestRequest, stats: IngestStats, message: String) -> IngestResult {
    IngestResult {
        doc_id: request.doc_id.clone(),
        status: IngestStatus::Failed,
        error: Some(message),
        chunk_count: 0,
        avg_tokens: 0.0,
        stats,
    }
}

fn document_record(
    request: &IngestRequest,
    extracted: &crate::rag::ingest::extract::ExtractedText,
    local_path: &std::path::Path,
    bytes: &[u8],
) -> IngestedDocument {
    IngestedDocument {
        id: request.doc_id.clone(),
        party_id: request.party_id.clone(),
        source_url: request.url.clone(),
        local_path: local_path.to_string_lossy().into_owned(),
        page_count: extracted.page_count,
        byte_size: bytes.len() as u64,
        downloaded_at: Utc::now(),
        parsed_at: Some(Utc::now()),
        metadata: request.metadata.clone(),
    }
}

/// Embed `contents` in sub-batches of [`EMBED_BATCH_SIZE`], retrying each
/// batch up to [`EMBED_MAX_RETRIES`] times on transient failure (§4.9
/// step 5). All-or-nothing: any batch's exhausted retries fail the whole
/// call.
async fn embed_with_retry(
    provider: &dyn EmbeddingProvider,
    contents: &[String],
) -> crate::types::Result<Vec<Vec<f32>>> {
    let mut out = Vec::with_capacity(contents.len());
    for batch in contents.chunks(EMBED_BATCH_SIZE) {
        let mut attempt = 0;
        loop {
            match provider.embed_batch(batch).await {
                Ok(vectors) => {
                    out.extend(vectors);
                    break;
                }
                Err(e) if attempt + 1 < EMBED_MAX_RETRIES => {
                    attempt += 1;
                    warn!(attempt, error = %e, "embedding batch failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(250 * attempt as u64)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::vectorstore::InMemoryVectorStore;
    use async_trait::async_trait;

    struct StubEmbeddings;

    #[async_trait]
    impl EmbeddingProvider for StubEmbeddings {
        async fn embed_batch(&self, texts: &[String]) -> crate::types::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.1, 0.2, 0.3]).collect())
        }
        fn dimension(&self) -> usize {
            3
        }
        fn model_name(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn embed_with_retry_succeeds_on_first_try() {
        let provider = StubEmbeddings;
        let contents = vec!["uno".to_string(), "dos".to_string()];
        let result = embed_with_retry(&provider, &contents).await.unwrap();
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn document_store_and_vector_store_wire_together() {
        let store = Arc::new(InMemoryVectorStore::new());
        store.create_collection("docs", 3).await.unwrap();
        assert_eq!(store.count_chunks("docs", None).await.unwrap(), 0);
    }
}
