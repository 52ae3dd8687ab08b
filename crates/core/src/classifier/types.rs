use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a record was not promoted to a download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    /// Neither a source nor a PDF reference to derive an identity from.
    NoIdentity,
    /// Empty abstract or title.
    NoText,
    /// No direct or derivable PDF reference.
    NoPdf,
    /// None of the configured keywords matched.
    Topic,
    /// Detected language differs from the target, or confidence too low.
    Language,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoIdentity => "no-identity",
            Self::NoText => "no-text",
            Self::NoPdf => "no-pdf",
            Self::Topic => "topic",
            Self::Language => "language",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(RejectReason),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// A language guess from a [`LanguageDetector`](super::LanguageDetector).
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// ISO 639-3 code.
    pub language: String,
    /// 0.0-1.0
    pub confidence: f64,
}
