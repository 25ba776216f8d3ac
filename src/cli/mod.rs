//! CLI argument parsing for the `ticobot-rag-ingest` binary.
//!
//! Uses `clap` for argument parsing and `owo-colors` for colored terminal
//! output, the same pair the server binary's surrounding crate uses
//! elsewhere for operator-facing tooling.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// ticobot-rag ingestion CLI: download, extract, chunk, embed, and persist
/// one or more government-plan PDFs outside the HTTP admin endpoints.
#[derive(Parser, Debug)]
#[command(
    name = "ticobot-rag-ingest",
    author,
    version,
    about = "Ingest government plan PDFs into ticobot-rag's vector store",
    long_about = "Downloads, extracts, chunks, embeds, and persists one or more PDF\n\
                  government plans, using the same ingestion pipeline (C5-C9) the\n\
                  server's `/ingest` endpoints use. Intended for bulk loading and\n\
                  scripted re-ingestion; the HTTP API remains the source of truth\n\
                  for single-document admin operations."
)]
pub struct Cli {
    /// Vector store collection to ingest into. Defaults to `VECTOR_COLLECTION`
    /// (or its own default) if unset.
    #[arg(long)]
    pub collection: Option<String>,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest a single document by URL.
    One {
        /// URL to download the PDF from.
        url: String,
        /// Stable external document id.
        #[arg(long)]
        doc_id: String,
        /// Owning party slug.
        #[arg(long)]
        party_id: String,
    },

    /// Ingest a batch of documents described by a JSON manifest file.
    ///
    /// The manifest is a JSON array of `{url, doc_id, party_id}` objects,
    /// the same shape as an `IngestBatchRequest`'s `documents` field.
    Batch {
        /// Path to the JSON manifest file.
        manifest: PathBuf,
    },
}

impl Cli {
    /// Parse CLI arguments from `std::env::args`.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Process exit codes, per the ingestion CLI's documented contract:
/// 0 on full success, 1 when some documents failed, 2 when all documents
/// failed or a fatal configuration error prevented the run from starting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Every requested document ingested successfully.
    Success = 0,
    /// At least one document ingested but at least one failed.
    Partial = 1,
    /// No document ingested, or the run never started.
    Failure = 2,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

/// Derive the process exit code from a batch of ingestion outcomes.
pub fn exit_code_for(results: &[crate::types::IngestResult]) -> ExitCode {
    use crate::types::IngestStatus;

    if results.is_empty() {
        return ExitCode::Failure;
    }
    let failures = results
        .iter()
        .filter(|r| r.status == IngestStatus::Failed)
        .count();
    if failures == 0 {
        ExitCode::Success
    } else if failures == results.len() {
        ExitCode::Failure
    } else {
        ExitCode::Partial
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{IngestStats, IngestStatus};

    fn result(status: IngestStatus) -> crate::types::IngestResult {
        crate::types::IngestResult {
            doc_id: "d".to_string(),
            status,
            error: None,
            chunk_count: 0,
            avg_tokens: 0.0,
            stats: IngestStats::default(),
        }
    }

    #[test]
    fn empty_batch_is_failure() {
        assert_eq!(exit_code_for(&[]), ExitCode::Failure);
    }

    #[test]
    fn all_success_is_success() {
        let results = vec![result(IngestStatus::Success), result(IngestStatus::Success)];
        assert_eq!(exit_code_for(&results), ExitCode::Success);
    }

    #[test]
    fn mixed_outcomes_is_partial() {
        let results = vec![result(IngestStatus::Success), result(IngestStatus::Failed)];
        assert_eq!(exit_code_for(&results), ExitCode::Partial);
    }

    #[test]
    fn all_failed_is_failure() {
        let results = vec![result(IngestStatus::Failed), result(IngestStatus::Failed)];
        assert_eq!(exit_code_for(&results), ExitCode::Failure);
    }

    #[test]
    fn partial_status_alone_is_success_not_failure() {
        let results = vec![result(IngestStatus::Partial)];
        assert_eq!(exit_code_for(&results), ExitCode::Success);
    }
}
