//! Candidate records and download tasks.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Stable identity of a source record, derived from its canonical reference.
///
/// Titles repeat and go missing, so they never take part in identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Derive an identity from a source reference, falling back to the PDF reference.
    ///
    /// Returns `None` when neither reference is usable.
    pub fn derive(source_url: &str, pdf_url: &str) -> Option<Self> {
        canonical_reference(source_url)
            .or_else(|| canonical_reference(pdf_url))
            .map(Self)
    }

    /// Wrap an already canonical key.
    pub fn from_key(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalize a reference: trim, drop the fragment and trailing slashes,
/// lowercase scheme and host.
fn canonical_reference(reference: &str) -> Option<String> {
    let trimmed = reference.trim();
    let without_fragment = trimmed.split('#').next().unwrap_or_default();
    let without_slash = without_fragment.trim_end_matches('/');
    if without_slash.is_empty() {
        return None;
    }

    match without_slash.split_once("://") {
        Some((scheme, rest)) => {
            let (host, path) = match rest.find('/') {
                Some(idx) => rest.split_at(idx),
                None => (rest, ""),
            };
            Some(format!(
                "{}://{}{}",
                scheme.to_ascii_lowercase(),
                host.to_ascii_lowercase(),
                path
            ))
        }
        None => Some(without_slash.to_string()),
    }
}

/// A candidate discovered from the feed. Never mutated after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub journal_title: String,
    pub title: String,
    /// Comma-separated author names.
    pub authors: String,
    /// Semicolon-separated affiliations (best effort).
    pub affiliation: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Canonical page of the record in the source directory.
    pub source_url: String,
    /// Direct PDF link, if the source exposed one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    /// Fulltext landing page, used to derive a PDF reference when no direct link exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landing_url: Option<String>,
}

impl Record {
    /// Identity of this record, if one can be derived.
    pub fn id(&self) -> Option<RecordId> {
        RecordId::derive(&self.source_url, self.pdf_url.as_deref().unwrap_or_default())
    }

    /// The PDF reference to fetch: the direct link, or a landing link that
    /// looks like a download.
    pub fn resolved_pdf_url(&self) -> Option<&str> {
        if let Some(url) = self.pdf_url.as_deref().map(str::trim) {
            if !url.is_empty() {
                return Some(url);
            }
        }
        self.landing_url
            .as_deref()
            .map(str::trim)
            .filter(|url| looks_like_pdf_link(url))
    }
}

fn looks_like_pdf_link(url: &str) -> bool {
    let lower = url.to_lowercase();
    !lower.is_empty() && (lower.contains("pdf") || lower.contains("download"))
}

/// A record that passed classification and dedup, ready for the fetch pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub id: RecordId,
    pub pdf_url: String,
    /// Payload path relative to the payload directory.
    pub file_name: PathBuf,
    /// Carried along so the index row can be written on completion.
    pub record: Record,
}

/// Collapse internal whitespace runs to single spaces and trim.
pub fn normalize_spaces(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Join values with `sep`, dropping blanks and repeats while keeping first-seen order.
pub fn join_unique<I, S>(values: I, sep: &str) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen: Vec<String> = Vec::new();
    for value in values {
        let value = normalize_spaces(value.as_ref());
        if !value.is_empty() && !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen.join(sep)
}
