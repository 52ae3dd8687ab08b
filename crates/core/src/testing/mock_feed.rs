//! Mock discovery feed for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::discovery::{DiscoveryFeed, FeedCursor, FeedError, FeedPage};
use crate::record::Record;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock implementation of the DiscoveryFeed trait.
///
/// Serves a fixed list of pages. The cursor of page `n` is `"n"`; the start
/// cursor reads page 0.
///
/// # Example
///
/// ```rust,ignore
/// use harvest_core::testing::{fixtures, MockFeed};
///
/// let feed = MockFeed::new(vec![
///     (0..10).map(fixtures::record).collect(),
///     (10..20).map(fixtures::record).collect(),
/// ])
/// .with_failures(1, vec![503]);
///
/// // ... run the controller ...
/// assert_eq!(feed.requested(), vec![FeedCursor::start(), FeedCursor::new("1"), FeedCursor::new("1")]);
/// ```
#[derive(Debug, Default)]
pub struct MockFeed {
    pages: Vec<Vec<Record>>,
    /// HTTP statuses returned for a page before it is served.
    failures: Mutex<HashMap<usize, VecDeque<u16>>>,
    /// Pages that never answer until cancelled.
    hangs: HashSet<usize>,
    requests: Mutex<Vec<FeedCursor>>,
}

impl MockFeed {
    pub fn new(pages: Vec<Vec<Record>>) -> Self {
        Self {
            pages,
            ..Default::default()
        }
    }

    /// Fail requests for `page` with these statuses, in order, before serving it.
    pub fn with_failures(self, page: usize, statuses: Vec<u16>) -> Self {
        lock(&self.failures).insert(page, statuses.into());
        self
    }

    /// Make requests for `page` block until cancelled.
    pub fn with_hang(mut self, page: usize) -> Self {
        self.hangs.insert(page);
        self
    }

    /// Cursor for page `n`.
    pub fn cursor(n: usize) -> FeedCursor {
        if n == 0 {
            FeedCursor::start()
        } else {
            FeedCursor::new(n.to_string())
        }
    }

    /// Cursors requested so far, in order.
    pub fn requested(&self) -> Vec<FeedCursor> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    fn parse(cursor: &FeedCursor) -> Result<usize, FeedError> {
        if cursor.is_start() {
            return Ok(0);
        }
        cursor
            .as_str()
            .parse()
            .map_err(|_| FeedError::InvalidCursor(cursor.as_str().to_string()))
    }
}

#[async_trait]
impl DiscoveryFeed for MockFeed {
    fn name(&self) -> &str {
        "mock"
    }

    async fn next_page(
        &self,
        cursor: &FeedCursor,
        cancel: &CancellationToken,
    ) -> Result<FeedPage, FeedError> {
        lock(&self.requests).push(cursor.clone());
        let n = Self::parse(cursor)?;

        if self.hangs.contains(&n) {
            cancel.cancelled().await;
            return Err(FeedError::Cancelled);
        }
        if let Some(status) = lock(&self.failures).get_mut(&n).and_then(|q| q.pop_front()) {
            return Err(FeedError::Http { status });
        }

        let records = self.pages.get(n).cloned().unwrap_or_default();
        let next = (n + 1 < self.pages.len()).then(|| Self::cursor(n + 1));
        Ok(FeedPage { records, next })
    }
}
