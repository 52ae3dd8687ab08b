use std::path::PathBuf;

use thiserror::Error;

use super::{LoadReport, Outcome, ProgressEntry};
use crate::record::RecordId;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Index I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Index CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Index at {path} is unreadable: {reason}")]
    Unrecoverable { path: PathBuf, reason: String },

    #[error("Identity {0} already succeeded; entry is immutable")]
    AlreadySucceeded(RecordId),

    #[error("Index has not been loaded")]
    NotLoaded,

    #[error("Index lock poisoned")]
    Poisoned,

    #[error("Index writer is closed")]
    WriterClosed,
}

/// Durable set of identities with their terminal outcome.
///
/// Calls are synchronous; in the running system only the index writer task
/// calls [`record`](ProgressStore::record), so rows are appended by a single
/// writer.
pub trait ProgressStore: Send + Sync {
    /// Returns the name of this store implementation.
    fn name(&self) -> &str;

    /// Read durable state into memory. Called once at startup, before any
    /// other method.
    fn load(&self) -> Result<LoadReport, IndexError>;

    /// Resolved outcome of an identity, if any.
    fn outcome(&self, id: &RecordId) -> Option<Outcome>;

    /// Whether the identity is settled and must not be processed again.
    /// Failed identities stay eligible.
    fn contains(&self, id: &RecordId) -> bool {
        self.outcome(id).is_some_and(|o| o.is_settled())
    }

    /// Durably persist an entry. Returns only once the entry survives a crash.
    fn record(&self, entry: &ProgressEntry) -> Result<(), IndexError>;

    /// Number of distinct succeeded identities.
    fn succeeded_count(&self) -> u64;

    /// Entries whose resolved outcome is failed, oldest first.
    fn retry_candidates(&self) -> Vec<ProgressEntry>;
}
