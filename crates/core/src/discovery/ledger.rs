use std::collections::VecDeque;

use super::types::FeedCursor;

/// Handle to a page tracked by a [`CursorLedger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageId(u64);

#[derive(Debug)]
struct PageSlot {
    id: PageId,
    cursor: FeedCursor,
    pending: usize,
}

/// Tracks which fetched pages still have unsettled records.
///
/// The resume cursor is the oldest page with pending work, so a restart
/// re-reads that page instead of skipping records that were queued or in
/// flight. Re-read records that already settled are filtered by the index.
#[derive(Debug)]
pub struct CursorLedger {
    pages: VecDeque<PageSlot>,
    next_id: u64,
    /// Cursor of the next page to fetch; `None` once the feed is exhausted.
    frontier: Option<FeedCursor>,
}

impl CursorLedger {
    pub fn new(start: FeedCursor) -> Self {
        Self {
            pages: VecDeque::new(),
            next_id: 0,
            frontier: Some(start),
        }
    }

    /// Register a fetched page read at `cursor` whose successor is `next`.
    pub fn open_page(&mut self, cursor: FeedCursor, next: Option<FeedCursor>) -> PageId {
        self.prune();
        let id = PageId(self.next_id);
        self.next_id += 1;
        self.pages.push_back(PageSlot {
            id,
            cursor,
            pending: 0,
        });
        self.frontier = next;
        id
    }

    /// One more record from `page` is waiting to settle.
    pub fn hold(&mut self, page: PageId) {
        if let Some(slot) = self.pages.iter_mut().find(|s| s.id == page) {
            slot.pending += 1;
        }
    }

    /// A record from `page` settled.
    pub fn release(&mut self, page: PageId) {
        if let Some(slot) = self.pages.iter_mut().find(|s| s.id == page) {
            slot.pending = slot.pending.saturating_sub(1);
        }
        self.prune();
    }

    /// Where a restarted walk should begin. `None` when the feed is exhausted
    /// and nothing is pending.
    pub fn resume_cursor(&self) -> Option<FeedCursor> {
        self.pages
            .iter()
            .find(|s| s.pending > 0)
            .map(|s| s.cursor.clone())
            .or_else(|| self.frontier.clone())
    }

    /// Drop settled pages from the front.
    fn prune(&mut self) {
        while self.pages.front().is_some_and(|s| s.pending == 0) {
            self.pages.pop_front();
        }
    }
}
