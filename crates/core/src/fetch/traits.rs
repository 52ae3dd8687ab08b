//! Trait definitions for the fetch module.

use async_trait::async_trait;
use std::time::Duration;

use super::types::{FetchError, Payload};

/// Retrieves the bytes behind a PDF reference.
#[async_trait]
pub trait FetchTransport: Send + Sync {
    /// Returns the name of this transport implementation.
    fn name(&self) -> &str;

    /// Fetch `url`, giving up after `timeout` (connect + transfer).
    ///
    /// Non-success statuses are errors; the body is returned unvalidated.
    async fn get(&self, url: &str, timeout: Duration) -> Result<Payload, FetchError>;
}
