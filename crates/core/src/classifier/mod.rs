//! Record classification.
//!
//! A record is accepted only if it has an identity, a non-empty title and
//! abstract, a direct or derivable PDF reference, at least one topic keyword,
//! and an abstract in the target language.

mod detector;
mod filter;
mod types;

pub use detector::{LanguageDetector, WhatlangDetector};
pub use filter::Classifier;
pub use types::{Detection, RejectReason, Verdict};
