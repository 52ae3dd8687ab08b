//! Language identification.

use super::types::Detection;

/// Identifies the language of a piece of text.
///
/// Implementations must be deterministic for the same input.
pub trait LanguageDetector: Send + Sync {
    /// Returns the name of this detector implementation.
    fn name(&self) -> &str;

    /// Best guess for `text`, or `None` when no guess can be made.
    fn detect(&self, text: &str) -> Option<Detection>;
}

/// Trigram-model detector backed by `whatlang`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WhatlangDetector;

impl LanguageDetector for WhatlangDetector {
    fn name(&self) -> &str {
        "whatlang"
    }

    fn detect(&self, text: &str) -> Option<Detection> {
        whatlang::detect(text).map(|info| Detection {
            language: info.lang().code().to_string(),
            confidence: info.confidence(),
        })
    }
}
