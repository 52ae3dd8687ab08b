//! Deterministic payload file names.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

use super::types::{normalize_spaces, RecordId};

/// Subdirectory of the payload directory that holds the PDFs.
pub const PAYLOAD_SUBDIR: &str = "pdfs";

/// How payload files are named. Selected once at startup.
///
/// Both variants are pure functions of the identity (and title), so the same
/// record always maps to the same file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum NamingStrategy {
    /// `pdfs/<sha256(identity)>.pdf`
    Hash,
    /// `pdfs/<slug(title)>-<short hash>.pdf`, falling back to `Hash` for empty slugs.
    TitleSlug {
        #[serde(default = "default_hash_len")]
        hash_len: usize,
        #[serde(default = "default_slug_max_len")]
        slug_max_len: usize,
    },
}

impl Default for NamingStrategy {
    fn default() -> Self {
        Self::TitleSlug {
            hash_len: default_hash_len(),
            slug_max_len: default_slug_max_len(),
        }
    }
}

fn default_hash_len() -> usize {
    10
}

fn default_slug_max_len() -> usize {
    120
}

impl NamingStrategy {
    /// Payload path relative to the payload directory.
    pub fn file_name(&self, id: &RecordId, title: &str) -> PathBuf {
        let digest = identity_digest(id);
        let stem = match *self {
            Self::Hash => digest,
            Self::TitleSlug {
                hash_len,
                slug_max_len,
            } => {
                let slug = slugify(title, slug_max_len);
                if slug.is_empty() {
                    digest
                } else {
                    let short = &digest[..hash_len.clamp(6, digest.len())];
                    format!("{}-{}", slug, short)
                }
            }
        };
        PathBuf::from(PAYLOAD_SUBDIR).join(format!("{}.pdf", stem))
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::TitleSlug { .. } => "title_slug",
        }
    }
}

/// Lowercase hex SHA-256 of the identity key.
pub fn identity_digest(id: &RecordId) -> String {
    format!("{:x}", Sha256::digest(id.as_str().as_bytes()))
}

/// Filesystem-safe slug: lowercase ASCII letters and digits joined by single hyphens.
pub fn slugify(value: &str, max_len: usize) -> String {
    let lowered = normalize_spaces(value).to_lowercase();

    let mut slug = String::with_capacity(lowered.len());
    let mut pending_hyphen = false;
    for ch in lowered.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch);
        } else {
            pending_hyphen = true;
        }
    }

    // Only ASCII remains, so byte truncation is safe.
    slug.truncate(max_len.max(1));
    slug.trim_matches(|c| c == '-' || c == '.' || c == ' ')
        .to_string()
}
