//! `ticobot-rag-ingest` binary: standalone CLI wrapper around the
//! ingestion pipeline (C5-C9), for bulk/scripted loading outside the
//! HTTP admin endpoints.

use std::sync::Arc;

use owo_colors::OwoColorize;

use ticobot_rag::cli::{exit_code_for, Cli, Commands, ExitCode};
use ticobot_rag::db::vectorstore::VectorStoreProvider;
use ticobot_rag::db::DocumentStore;
use ticobot_rag::rag::chunker::TextChunker;
use ticobot_rag::rag::embeddings;
use ticobot_rag::rag::ingest::{Downloader, IngestOptions, IngestionPipeline};
use ticobot_rag::types::{IngestRequest, IngestResult, IngestStatus};
use ticobot_rag::utils::RagConfig;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse_args();

    let config = match RagConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {e}", "configuration error:".red().bold());
            std::process::exit(ExitCode::Failure.into());
        }
    };
    let collection = cli.collection.clone().unwrap_or(config.collection.clone());

    let pipeline = match build_pipeline(&config).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{} {e}", "startup error:".red().bold());
            std::process::exit(ExitCode::Failure.into());
        }
    };

    let requests = match load_requests(cli.command) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{} {e}", "manifest error:".red().bold());
            std::process::exit(ExitCode::Failure.into());
        }
    };

    let options = IngestOptions { collection };
    let mut results: Vec<IngestResult> = Vec::with_capacity(requests.len());
    for request in &requests {
        let result = pipeline.ingest(request, &options).await;
        print_result(&result, cli.no_color);
        results.push(result);
    }

    let code = exit_code_for(&results);
    if !cli.no_color {
        println!("{}", summary_line(&results, code).bold());
    } else {
        println!("{}", summary_line(&results, code));
    }
    std::process::exit(code.into());
}

async fn build_pipeline(config: &RagConfig) -> ticobot_rag::Result<IngestionPipeline> {
    let embeddings_client: Arc<dyn embeddings::EmbeddingProvider> =
        Arc::from(embeddings::Provider::from_env()?.create_client()?);

    let vector_store = VectorStoreProvider::from_env().create_store().await?;
    let vector_store: Arc<dyn ticobot_rag::db::VectorStore> = Arc::from(vector_store);
    if !vector_store.collection_exists(&config.collection).await? {
        vector_store
            .create_collection(&config.collection, embeddings_client.dimension())
            .await?;
    }

    let downloader = Arc::new(
        Downloader::new(config.download.dir.clone())?
            .with_timeout(config.download.timeout)
            .with_max_attempts(config.download.retries)
            .with_concurrency(config.download.concurrency),
    );

    Ok(IngestionPipeline {
        downloader,
        chunker: TextChunker::new(config.chunker),
        embeddings: embeddings_client,
        store: vector_store,
        documents: Arc::new(DocumentStore::new()),
    })
}

fn load_requests(command: Commands) -> Result<Vec<IngestRequest>, String> {
    match command {
        Commands::One { url, doc_id, party_id } => Ok(vec![IngestRequest {
            url,
            doc_id,
            party_id,
            metadata: Default::default(),
        }]),
        Commands::Batch { manifest } => {
            let raw = std::fs::read_to_string(&manifest)
                .map_err(|e| format!("reading {manifest:?}: {e}"))?;
            serde_json::from_str(&raw).map_err(|e| format!("parsing {manifest:?}: {e}"))
        }
    }
}

fn print_result(result: &IngestResult, no_color: bool) {
    let line = format!(
        "{:<40} {:?} chunks={} avg_tokens={:.0}{}",
        result.doc_id,
        result.status,
        result.chunk_count,
        result.avg_tokens,
        result
            .error
            .as_ref()
            .map(|e| format!(" error={e}"))
            .unwrap_or_default()
    );
    if no_color {
        println!("{line}");
        return;
    }
    match result.status {
        IngestStatus::Success => println!("{}", line.green()),
        IngestStatus::Partial => println!("{}", line.yellow()),
        IngestStatus::Failed => println!("{}", line.red()),
    }
}

fn summary_line(results: &[IngestResult], code: ExitCode) -> String {
    let success = results.iter().filter(|r| r.status == IngestStatus::Success).count();
    let partial = results.iter().filter(|r| r.status == IngestStatus::Partial).count();
    let failed = results.iter().filter(|r| r.status == IngestStatus::Failed).count();
    format!(
        "{} succeeded, {} partial, {} failed (exit {})",
        success,
        partial,
        failed,
        i32::from(code)
    )
}
