use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use crate::classifier::RejectReason;
use crate::discovery::JobStateError;
use crate::progress::{IndexError, LoadReport};

/// Fatal startup errors. Everything that goes wrong per record or per task
/// is counted in the [`RunSummary`] instead.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Cannot prepare payload directory {path}")]
    PayloadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    JobState(#[from] JobStateError),
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The counter reached the target during this run.
    TargetReached,
    /// The counter was already at the target on startup; nothing was fetched.
    AlreadyComplete,
    /// The feed ran out before the target was reached.
    SourceExhausted,
    /// Stopped by an external cancellation.
    Interrupted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TargetReached => "target_reached",
            Self::AlreadyComplete => "already_complete",
            Self::SourceExhausted => "source_exhausted",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final report of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub target: u64,
    /// Successes carried over from earlier runs.
    pub succeeded_before: u64,
    /// Successes in total at the end of the run.
    pub succeeded: u64,
    /// Payloads downloaded in this run.
    pub fetched: u64,
    /// Successes credited from files already on disk.
    pub reused: u64,
    /// Previously failed identities submitted again.
    pub retried: u64,
    pub rejected: BTreeMap<RejectReason, u64>,
    pub duplicates: u64,
    pub failed: u64,
    /// Cut off by the drain timeout; recorded as failed.
    pub abandoned: u64,
    pub pages: u64,
    /// Feed pages given up on after retries.
    pub feed_errors: u64,
    pub index: LoadReport,
}

impl RunSummary {
    pub fn new(run_id: Uuid, target: u64, succeeded_before: u64, index: LoadReport) -> Self {
        Self {
            run_id,
            status: RunStatus::SourceExhausted,
            target,
            succeeded_before,
            succeeded: succeeded_before,
            fetched: 0,
            reused: 0,
            retried: 0,
            rejected: BTreeMap::new(),
            duplicates: 0,
            failed: 0,
            abandoned: 0,
            pages: 0,
            feed_errors: 0,
            index,
        }
    }

    pub fn rejected_total(&self) -> u64 {
        self.rejected.values().sum()
    }

    /// Whether the source ran dry below the target.
    pub fn exhausted(&self) -> bool {
        self.status == RunStatus::SourceExhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_serializes_reject_reasons() {
        let mut summary = RunSummary::new(Uuid::new_v4(), 10, 3, LoadReport::default());
        summary.rejected.insert(RejectReason::Language, 4);
        summary.rejected.insert(RejectReason::NoPdf, 1);
        summary.status = RunStatus::TargetReached;

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["status"], "target_reached");
        assert_eq!(json["rejected"]["language"], 4);
        assert_eq!(json["rejected"]["no-pdf"], 1);
        assert_eq!(summary.rejected_total(), 5);
        assert!(!summary.exhausted());
    }
}
