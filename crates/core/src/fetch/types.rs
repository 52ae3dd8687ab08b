//! Types for the fetch worker pool.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::record::{DownloadTask, RecordId};

/// A fetched response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub body: Vec<u8>,
    /// Value of the Content-Type header, if any.
    pub content_type: Option<String>,
    /// URL after redirects.
    pub final_url: String,
}

/// Errors from a single fetch attempt.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Could not connect.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The attempt exceeded its time budget.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Connection dropped or body could not be read to the end.
    #[error("Transfer interrupted: {0}")]
    Transfer(String),

    /// Non-success HTTP status.
    #[error("HTTP status {status}")]
    Http { status: u16 },

    /// The server answered with no content.
    #[error("Empty response body")]
    EmptyBody,

    /// The body is not a PDF.
    #[error("Unexpected content type: {0}")]
    InvalidContentType(String),

    /// Request could not be built or sent (bad URL, redirect loop, ...).
    #[error("Request failed: {0}")]
    Request(String),

    /// Failed to persist the payload.
    #[error("Failed to write payload {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Timeout(_) | Self::Transfer(_) | Self::EmptyBody => true,
            Self::Http { status } => *status == 408 || *status == 429 || *status >= 500,
            Self::InvalidContentType(_) | Self::Request(_) | Self::Write { .. } => false,
        }
    }
}

/// Result of one download task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Payload is on disk at `path` (relative to the payload directory).
    Succeeded {
        path: PathBuf,
        bytes: u64,
        /// The file already existed and no request was made.
        reused: bool,
    },
    /// All attempts failed.
    Failed { reason: String, retryable: bool },
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// A finished task handed back to the controller.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task: DownloadTask,
    pub outcome: FetchOutcome,
    pub attempts: u32,
}

/// Errors from the pool itself.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Task already in flight: {0}")]
    AlreadyInFlight(RecordId),
}

/// Snapshot of pool statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStatus {
    pub active: usize,
    pub max_concurrent: usize,
    pub in_flight: usize,
    pub succeeded: u64,
    pub reused: u64,
    pub failed: u64,
    pub retries: u64,
}
