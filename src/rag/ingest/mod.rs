//! Document ingestion: download (C5), text extraction (C6), and pipeline
//! orchestration (C9).

pub mod download;
pub mod extract;
pub mod pipeline;

pub use download::{DownloadError, DownloadResult, Downloader};
pub use extract::{extract_and_clean, ExtractedText};
pub use pipeline::{IngestOptions, IngestionPipeline};
