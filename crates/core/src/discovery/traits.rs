use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::types::{FeedCursor, FeedError, FeedPage};

/// Source of candidate records.
///
/// `next_page` must be idempotent for the same cursor so that a failed or
/// interrupted request can simply be retried.
#[async_trait]
pub trait DiscoveryFeed: Send + Sync {
    /// Returns the name of this feed implementation.
    fn name(&self) -> &str;

    /// Fetch the page at `cursor`. Returns [`FeedError::Cancelled`] promptly
    /// once `cancel` fires.
    async fn next_page(
        &self,
        cursor: &FeedCursor,
        cancel: &CancellationToken,
    ) -> Result<FeedPage, FeedError>;
}
