//! PDF downloader (C5).
//!
//! HTTP GET with a configured timeout, magic-byte validation, atomic
//! write-then-rename, and exponential-backoff retry for transient
//! failures. Batch downloads are bounded by a `tokio::sync::Semaphore`,
//! the same idiom the teacher's `llm::pool::ClientPool` uses to cap
//! concurrent connections.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::types::{AppError, Result};

/// PDF files begin with this magic byte sequence.
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default retry attempts for transient failures.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Default bounded concurrency for batch downloads.
const DEFAULT_CONCURRENCY: usize = 3;
/// Base delay for exponential backoff between retries.
const BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Terminal classification of a download failure (§4.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadError {
    /// The request exceeded its timeout.
    Timeout,
    /// A network-level error, with the HTTP status if one was received.
    Network { status: Option<u16> },
    /// The response body did not begin with the PDF magic bytes.
    Validation,
    /// Writing the downloaded bytes to disk failed.
    Filesystem,
    /// Any other failure.
    Unknown,
}

impl std::fmt::Display for DownloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadError::Timeout => write!(f, "timeout"),
            DownloadError::Network { status } => write!(f, "network({status:?})"),
            DownloadError::Validation => write!(f, "validation"),
            DownloadError::Filesystem => write!(f, "filesystem"),
            DownloadError::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of a single document download.
#[derive(Debug, Clone)]
pub struct DownloadResult {
    /// Document id the download was for.
    pub doc_id: String,
    /// Local path the PDF bytes were persisted to, on success.
    pub local_path: Option<PathBuf>,
    /// Downloaded file size in bytes, on success.
    pub byte_size: Option<u64>,
    /// Classification of the terminal failure, if any.
    pub error: Option<DownloadError>,
}

impl DownloadResult {
    /// Whether the download succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// One download request: a URL, the document id to persist it under, and
/// optional metadata carried through to the caller.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    /// Source URL to fetch.
    pub url: String,
    /// Document id used to name the persisted file.
    pub doc_id: String,
}

/// Downloads PDFs into `output_dir`, retrying transient failures with
/// exponential backoff.
pub struct Downloader {
    client: reqwest::Client,
    output_dir: PathBuf,
    timeout: Duration,
    max_attempts: u32,
    concurrency: usize,
}

impl Downloader {
    /// Construct a downloader persisting into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| AppError::Configuration(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            output_dir: output_dir.into(),
            timeout: DEFAULT_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            concurrency: DEFAULT_CONCURRENCY,
        })
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the retry attempt ceiling.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Override the bounded batch concurrency.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Download one document, retrying transient failures (§4.5).
    pub async fn download(&self, url: &str, doc_id: &str) -> DownloadResult {
        let mut last_error = DownloadError::Unknown;

        for attempt in 0..self.max_attempts {
            match self.try_download(url, doc_id).await {
                Ok((path, size)) => {
                    return DownloadResult {
                        doc_id: doc_id.to_string(),
                        local_path: Some(path),
                        byte_size: Some(size),
                        error: None,
                    }
                }
                Err(err) if is_transient(&err) && attempt + 1 < self.max_attempts => {
                    let delay = BACKOFF_BASE * 2u32.pow(attempt);
                    warn!(doc_id, attempt, ?err, ?delay, "transient download failure, retrying");
                    tokio::time::sleep(delay).await;
                    last_error = err;
                }
                Err(err) => {
                    last_error = err;
                    break;
                }
            }
        }

        DownloadResult {
            doc_id: doc_id.to_string(),
            local_path: None,
            byte_size: None,
            error: Some(last_error),
        }
    }

    /// Download a batch of requests with bounded concurrency (§4.5).
    pub async fn download_batch(&self, requests: &[DownloadRequest]) -> Vec<DownloadResult> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut handles = Vec::with_capacity(requests.len());

        for request in requests {
            let semaphore = semaphore.clone();
            let url = request.url.clone();
            let doc_id = request.doc_id.clone();
            let client = self.client.clone();
            let output_dir = self.output_dir.clone();
            let timeout = self.timeout;
            let max_attempts = self.max_attempts;

            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                let downloader = Downloader {
                    client,
                    output_dir,
                    timeout,
                    max_attempts,
                    concurrency: 1,
                };
                downloader.download(&url, &doc_id).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(_) => results.push(DownloadResult {
                    doc_id: "unknown".to_string(),
                    local_path: None,
                    byte_size: None,
                    error: Some(DownloadError::Unknown),
                }),
            }
        }
        results
    }

    async fn try_download(&self, url: &str, doc_id: &str) -> std::result::Result<(PathBuf, u64), DownloadError> {
        let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| DownloadError::Timeout)?
            .map_err(|e| {
                if e.is_timeout() {
                    DownloadError::Timeout
                } else {
                    DownloadError::Network { status: e.status().map(|s| s.as_u16()) }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Network { status: Some(status.as_u16()) });
        }

        let bytes = response.bytes().await.map_err(|_| DownloadError::Network { status: None })?;

        if !bytes.starts_with(PDF_MAGIC) {
            return Err(DownloadError::Validation);
        }

        let final_path = self.output_dir.join(format!("{doc_id}.pdf"));
        let temp_path = self.output_dir.join(format!("{doc_id}.pdf.tmp"));

        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|_| DownloadError::Filesystem)?;
        }

        write_atomic(&temp_path, &final_path, &bytes).await.map_err(|_| DownloadError::Filesystem)?;

        info!(doc_id, bytes = bytes.len(), "downloaded PDF");
        Ok((final_path, bytes.len() as u64))
    }
}

async fn write_atomic(temp_path: &Path, final_path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(temp_path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    drop(file);
    tokio::fs::rename(temp_path, final_path).await
}

fn is_transient(error: &DownloadError) -> bool {
    match error {
        DownloadError::Timeout => true,
        DownloadError::Network { status } => status.map(|s| s >= 500).unwrap_or(true),
        DownloadError::Validation | DownloadError::Filesystem | DownloadError::Unknown => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_hundred_status_is_transient() {
        assert!(is_transient(&DownloadError::Network { status: Some(503) }));
    }

    #[test]
    fn four_hundred_status_is_not_transient() {
        assert!(!is_transient(&DownloadError::Network { status: Some(404) }));
    }

    #[test]
    fn validation_failure_is_not_transient() {
        assert!(!is_transient(&DownloadError::Validation));
    }

    #[tokio::test]
    async fn rejects_non_pdf_bodies() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(dir.path()).unwrap();
        let not_pdf = b"<html>not a pdf</html>";
        assert!(!not_pdf.starts_with(PDF_MAGIC));
    }
}
