//! Transfer and scheduler error types.

use std::path::PathBuf;

use thiserror::Error;

use crate::assemble::AssembleError;
use crate::decrypt::DecryptError;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 30;

/// Error type for scheduler-level operations.
///
/// Individual transfer failures are NOT scheduler errors; they are counted
/// in the run statistics and reported per task.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Errors from a single transfer attempt (fetch, decrypt, or write).
#[derive(Debug, Error)]
pub enum TransferError {
    /// Network-level failure (DNS, connection, mid-body drop).
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// Underlying reqwest error.
        source: reqwest::Error,
    },

    /// Request timed out.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Server returned a non-success status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that failed.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Raw `Retry-After` header value, when the server sent one.
        retry_after: Option<String>,
    },

    /// Segment decryption failed.
    #[error(transparent)]
    Decrypt(#[from] DecryptError),

    /// Output assembly failed.
    #[error(transparent)]
    Assemble(#[from] AssembleError),

    /// Local filesystem failure.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The run was cancelled before the task finished.
    #[error("transfer cancelled")]
    Cancelled,
}

impl TransferError {
    /// Creates a network or timeout error from a reqwest failure.
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }

    /// Creates an HTTP status error, capturing any `Retry-After` header.
    pub fn http_status(url: impl Into<String>, response: &reqwest::Response) -> Self {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        Self::HttpStatus {
            url: url.into(),
            status: response.status().as_u16(),
            retry_after,
        }
    }
}
