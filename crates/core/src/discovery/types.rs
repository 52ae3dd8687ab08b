use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::record::Record;

/// Opaque position in a discovery feed.
///
/// Only the feed that produced a cursor knows how to read it. The empty
/// cursor is the beginning of every feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedCursor(String);

impl FeedCursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn start() -> Self {
        Self::default()
    }

    pub fn is_start(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("<start>")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// One page of candidates.
#[derive(Debug, Clone, Default)]
pub struct FeedPage {
    pub records: Vec<Record>,
    /// Cursor of the following page; `None` at the end of the feed.
    pub next: Option<FeedCursor>,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Feed request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Feed connection failed: {0}")]
    Connect(String),

    #[error("Feed returned HTTP status {status}")]
    Http { status: u16 },

    #[error("Failed to decode feed page: {0}")]
    Decode(String),

    #[error("Invalid feed cursor '{0}'")]
    InvalidCursor(String),

    #[error("Feed request failed: {0}")]
    Request(String),

    #[error("Feed request cancelled")]
    Cancelled,
}

impl FeedError {
    /// Whether fetching the same cursor again may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Connect(_) | Self::Decode(_) => true,
            Self::Http { status } => *status == 408 || *status == 429 || *status >= 500,
            Self::InvalidCursor(_) | Self::Request(_) | Self::Cancelled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_cursor() {
        assert!(FeedCursor::start().is_start());
        assert!(!FeedCursor::new("0:2").is_start());
        assert_eq!(FeedCursor::start().to_string(), "<start>");
    }

    #[test]
    fn test_feed_error_retryable() {
        assert!(FeedError::Http { status: 502 }.is_retryable());
        assert!(FeedError::Decode("eof".into()).is_retryable());
        assert!(!FeedError::Http { status: 400 }.is_retryable());
        assert!(!FeedError::Cancelled.is_retryable());
    }
}
