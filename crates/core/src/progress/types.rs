//! Progress entries and the on-disk row format.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::record::{Record, RecordId};

/// Terminal outcome of one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Payload downloaded and persisted. Immutable once written.
    Succeeded,
    /// Classifier rejected the record.
    Rejected,
    /// Download failed or was abandoned; eligible for retry on a later run.
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }

    /// Whether an identity with this outcome must not be processed again.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Rejected)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "succeeded" => Ok(Self::Succeeded),
            "rejected" => Ok(Self::Rejected),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown outcome '{}'", other)),
        }
    }
}

/// Durable record of one identity's outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEntry {
    pub id: RecordId,
    pub outcome: Outcome,
    /// The record the outcome belongs to; its fields fill the index row.
    pub record: Record,
    /// The PDF reference that was (or would have been) fetched.
    pub pdf_url: String,
    /// Payload path relative to the payload directory, for successes.
    pub payload_path: Option<PathBuf>,
    pub recorded_at: DateTime<Utc>,
}

impl ProgressEntry {
    pub fn succeeded(id: RecordId, record: Record, pdf_url: String, payload_path: PathBuf) -> Self {
        Self {
            id,
            outcome: Outcome::Succeeded,
            record,
            pdf_url,
            payload_path: Some(payload_path),
            recorded_at: Utc::now(),
        }
    }

    pub fn failed(id: RecordId, record: Record, pdf_url: String) -> Self {
        Self {
            id,
            outcome: Outcome::Failed,
            record,
            pdf_url,
            payload_path: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn rejected(id: RecordId, record: Record) -> Self {
        let pdf_url = record.resolved_pdf_url().unwrap_or_default().to_string();
        Self {
            id,
            outcome: Outcome::Rejected,
            record,
            pdf_url,
            payload_path: None,
            recorded_at: Utc::now(),
        }
    }
}

/// Column order of the index file.
pub const INDEX_COLUMNS: [&str; 10] = [
    "journal_title",
    "title",
    "authors",
    "affiliation",
    "abstract",
    "pdf_url",
    "pdf_local_path",
    "source_url",
    "outcome",
    "recorded_at",
];

/// One row of the index file.
///
/// `outcome` and `recorded_at` default to empty so index files written
/// without those columns (successes only) still load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRow {
    pub journal_title: String,
    pub title: String,
    pub authors: String,
    pub affiliation: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub pdf_url: String,
    pub pdf_local_path: String,
    pub source_url: String,
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub recorded_at: String,
}

impl From<&ProgressEntry> for IndexRow {
    fn from(entry: &ProgressEntry) -> Self {
        let record = &entry.record;
        Self {
            journal_title: record.journal_title.clone(),
            title: record.title.clone(),
            authors: record.authors.clone(),
            affiliation: record.affiliation.clone(),
            abstract_text: record.abstract_text.clone(),
            pdf_url: entry.pdf_url.clone(),
            pdf_local_path: entry
                .payload_path
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            source_url: record.source_url.clone(),
            outcome: entry.outcome.as_str().to_string(),
            recorded_at: entry
                .recorded_at
                .to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

impl IndexRow {
    /// Rebuild an entry from a row.
    ///
    /// `strict` requires the outcome and timestamp columns to be present and
    /// valid; without it a row is a success exactly when it names a payload.
    pub fn into_entry(self, strict: bool) -> Result<ProgressEntry, String> {
        let id = RecordId::derive(&self.source_url, &self.pdf_url)
            .ok_or_else(|| "row has neither source_url nor pdf_url".to_string())?;

        let (outcome, recorded_at) = if strict {
            let outcome = Outcome::from_str(&self.outcome)?;
            let recorded_at = DateTime::parse_from_rfc3339(self.recorded_at.trim())
                .map_err(|e| format!("invalid recorded_at '{}': {}", self.recorded_at, e))?
                .with_timezone(&Utc);
            (outcome, recorded_at)
        } else if self.pdf_local_path.trim().is_empty() {
            (Outcome::Failed, DateTime::<Utc>::UNIX_EPOCH)
        } else {
            (Outcome::Succeeded, DateTime::<Utc>::UNIX_EPOCH)
        };

        let payload_path = Some(self.pdf_local_path.trim())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        if outcome == Outcome::Succeeded && payload_path.is_none() {
            return Err("succeeded row without pdf_local_path".to_string());
        }

        let pdf_url = self.pdf_url.trim().to_string();
        let record = Record {
            journal_title: self.journal_title,
            title: self.title,
            authors: self.authors,
            affiliation: self.affiliation,
            abstract_text: self.abstract_text,
            source_url: self.source_url,
            pdf_url: Some(pdf_url.clone()).filter(|u| !u.is_empty()),
            landing_url: None,
        };

        Ok(ProgressEntry {
            id,
            outcome,
            record,
            pdf_url,
            payload_path,
            recorded_at,
        })
    }
}

/// What `load()` found on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Valid rows read.
    pub rows: usize,
    /// Corrupt or partial rows that were skipped.
    pub skipped: usize,
    /// Distinct identities per resolved outcome.
    pub succeeded: u64,
    pub failed: u64,
    pub rejected: u64,
    /// Successes demoted to failed because their payload is gone.
    pub missing_payloads: usize,
    /// Where an unreadable index was moved when starting fresh.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quarantined: Option<PathBuf>,
}
