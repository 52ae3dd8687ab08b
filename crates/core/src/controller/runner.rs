//! Acquisition controller.
//!
//! Drives one run: discovery feed -> classifier -> dedup -> fetch pool ->
//! index + counter, until the target is reached, the feed runs dry, or the
//! run is cancelled. Discovery runs as its own task and hands pages over a
//! channel; everything else happens on the controller's task, which makes it
//! the single point where identities are checked and admitted. The feed is
//! only opened once queued retries can no longer reach the target alone.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::classifier::{Classifier, Verdict};
use crate::config::{Config, RetryConfig};
use crate::discovery::{
    CursorLedger, DiscoveryFeed, FeedCursor, FeedError, FeedPage, JobStateStore, PageId,
};
use crate::fetch::{ensure_payload_dir, sweep_partials, FetchOutcome, FetchPool, FetchTransport, TaskReport};
use crate::progress::{create_index_system, IndexHandle, ProgressEntry, ProgressStore};
use crate::record::{DownloadTask, Record, RecordId};

use super::counter::TargetCounter;
use super::types::{ControllerError, RunStatus, RunSummary};

/// Pending index writes before callers wait.
const INDEX_BUFFER: usize = 64;

/// Drives acquisition runs against a feed, a transport and a progress store.
pub struct AcquisitionController {
    config: Config,
    classifier: Classifier,
    feed: Arc<dyn DiscoveryFeed>,
    transport: Arc<dyn FetchTransport>,
    store: Arc<dyn ProgressStore>,
    cancel: CancellationToken,
}

impl AcquisitionController {
    pub fn new(
        config: Config,
        feed: Arc<dyn DiscoveryFeed>,
        transport: Arc<dyn FetchTransport>,
        store: Arc<dyn ProgressStore>,
    ) -> Self {
        let classifier = Classifier::new(&config.classifier);
        Self {
            config,
            classifier,
            feed,
            transport,
            store,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the classifier (e.g. one with a custom language detector).
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Token that interrupts the run when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until the target is reached, the feed is exhausted, or the run is
    /// cancelled. Errors only for fatal startup conditions.
    pub async fn run(&self) -> Result<RunSummary, ControllerError> {
        let run_id = Uuid::new_v4();
        self.execute(run_id)
            .instrument(info_span!("run", %run_id))
            .await
    }

    async fn execute(&self, run_id: Uuid) -> Result<RunSummary, ControllerError> {
        let storage = &self.config.storage;

        ensure_payload_dir(&storage.payload_dir)
            .await
            .map_err(|source| ControllerError::PayloadDir {
                path: storage.payload_dir.clone(),
                source,
            })?;
        let swept = sweep_partials(&storage.payload_dir)
            .await
            .map_err(|source| ControllerError::PayloadDir {
                path: storage.payload_dir.clone(),
                source,
            })?;
        if swept > 0 {
            info!(swept, "Removed partial payloads left by an interrupted run");
        }

        let report = self.store.load()?;
        let counter = TargetCounter::new(self.config.run.target, self.store.succeeded_count());
        let mut summary = RunSummary::new(run_id, counter.target(), counter.get(), report);

        info!(
            target = counter.target(),
            succeeded = counter.get(),
            remaining = counter.remaining(),
            feed = self.feed.name(),
            transport = self.transport.name(),
            naming = storage.naming.label(),
            concurrency = self.config.fetch.concurrency,
            "Starting acquisition run"
        );

        if counter.is_reached() {
            summary.status = RunStatus::AlreadyComplete;
            info!(
                succeeded = counter.get(),
                target = counter.target(),
                "Target already reached, nothing to do"
            );
            return Ok(summary);
        }

        let job_state = JobStateStore::new(&storage.job_dir);
        let start = job_state.load(self.feed.name())?.unwrap_or_default();

        let (index, writer) = create_index_system(Arc::clone(&self.store), INDEX_BUFFER);
        let writer_task = tokio::spawn(writer.run());

        let mut session = Session {
            controller: self,
            counter,
            index,
            pool: FetchPool::new(
                Arc::clone(&self.transport),
                storage.payload_dir.clone(),
                &self.config.fetch,
            ),
            ledger: CursorLedger::new(start.clone()),
            job_state,
            saved_cursor: Some(start),
            discovery: None,
            queue: VecDeque::new(),
            page_of: HashMap::new(),
            seen: HashSet::new(),
            halt: self.cancel.child_token(),
            summary,
        };

        if self.config.run.retry_failed {
            session.enqueue_backlog();
        }
        let status = session.run().await;
        let summary = session.finish(status).await;

        if let Err(e) = writer_task.await {
            error!("Index writer task failed: {}", e);
        }

        Ok(summary)
    }
}

/// Messages from the discovery task.
enum DiscoveryEvent {
    Page { cursor: FeedCursor, page: FeedPage },
    Exhausted,
    Failed(FeedError),
}

/// Next discovery event, or pending forever when discovery never started.
async fn next_event(
    discovery: &mut Option<(JoinHandle<()>, mpsc::Receiver<DiscoveryEvent>)>,
) -> Option<DiscoveryEvent> {
    match discovery {
        Some((_, events)) => events.recv().await,
        None => std::future::pending().await,
    }
}

/// Walk the feed from `cursor`, one request at a time, retrying transient
/// errors. Stops when cancelled, at the end of the feed, or when the
/// receiver goes away.
async fn discover(
    feed: Arc<dyn DiscoveryFeed>,
    mut cursor: FeedCursor,
    max_attempts: u32,
    retry: RetryConfig,
    cancel: CancellationToken,
    tx: mpsc::Sender<DiscoveryEvent>,
) {
    loop {
        let mut attempt = 0;
        let page = loop {
            attempt += 1;
            match feed.next_page(&cursor, &cancel).await {
                Ok(page) => break page,
                Err(FeedError::Cancelled) => return,
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = retry.delay_for(attempt);
                    warn!(
                        cursor = %cursor,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Feed request failed, retrying: {}",
                        e
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    error!(cursor = %cursor, attempt, "Giving up on feed: {}", e);
                    let _ = tx.send(DiscoveryEvent::Failed(e)).await;
                    return;
                }
            }
        };

        if cancel.is_cancelled() {
            return;
        }

        let next = page.next.clone();
        debug!(cursor = %cursor, records = page.records.len(), "Fetched feed page");
        if tx
            .send(DiscoveryEvent::Page {
                cursor: cursor.clone(),
                page,
            })
            .await
            .is_err()
        {
            return;
        }

        match next {
            Some(next) => cursor = next,
            None => {
                let _ = tx.send(DiscoveryEvent::Exhausted).await;
                return;
            }
        }
    }
}

/// Mutable state of one run.
struct Session<'a> {
    controller: &'a AcquisitionController,
    counter: TargetCounter,
    index: IndexHandle,
    pool: FetchPool,
    ledger: CursorLedger,
    job_state: JobStateStore,
    /// Cursor last written to the job state (`None` = cleared).
    saved_cursor: Option<FeedCursor>,
    /// Discovery task and its page channel, started on first demand.
    discovery: Option<(JoinHandle<()>, mpsc::Receiver<DiscoveryEvent>)>,
    /// Accepted tasks waiting for admission.
    queue: VecDeque<DownloadTask>,
    /// Page each queued or in-flight identity came from.
    page_of: HashMap<RecordId, PageId>,
    /// Identities handled in this run.
    seen: HashSet<RecordId>,
    halt: CancellationToken,
    summary: RunSummary,
}

impl Session<'_> {
    /// Queue identities whose last recorded outcome was a failure.
    fn enqueue_backlog(&mut self) {
        let naming = self.controller.config.storage.naming;
        for entry in self.controller.store.retry_candidates() {
            if !self.seen.insert(entry.id.clone()) {
                continue;
            }
            let file_name = naming.file_name(&entry.id, &entry.record.title);
            self.queue.push_back(DownloadTask {
                id: entry.id,
                pdf_url: entry.pdf_url,
                file_name,
                record: entry.record,
            });
            self.summary.retried += 1;
        }
        if self.summary.retried > 0 {
            info!(count = self.summary.retried, "Retrying previously failed downloads");
        }
    }

    async fn run(&mut self) -> RunStatus {
        let mut feed_open = true;

        loop {
            if self.counter.is_reached() {
                return RunStatus::TargetReached;
            }
            if self.halt.is_cancelled() {
                info!("Run interrupted");
                return RunStatus::Interrupted;
            }

            self.admit();

            let in_flight = self.pool.in_flight();
            let want_records = feed_open
                && self.queue.is_empty()
                && self.counter.get() + (in_flight as u64) < self.counter.target();
            if in_flight == 0 && !want_records {
                // Admission only stalls with nothing in flight once the
                // target is reached, so the queue is empty here.
                info!(
                    succeeded = self.counter.get(),
                    target = self.counter.target(),
                    "Source exhausted before reaching target"
                );
                return RunStatus::SourceExhausted;
            }
            if want_records && self.discovery.is_none() {
                self.open_discovery();
            }

            tokio::select! {
                biased;
                _ = self.halt.cancelled() => {}
                report = self.pool.next_completed(), if in_flight > 0 => {
                    if let Some(report) = report {
                        self.settle(report).await;
                    }
                }
                event = next_event(&mut self.discovery), if want_records => match event {
                    Some(DiscoveryEvent::Page { cursor, page }) => self.evaluate(cursor, page).await,
                    Some(DiscoveryEvent::Failed(e)) => {
                        warn!("Discovery stopped after repeated errors: {}", e);
                        self.summary.feed_errors += 1;
                        feed_open = false;
                    }
                    Some(DiscoveryEvent::Exhausted) | None => {
                        debug!("Discovery feed exhausted");
                        feed_open = false;
                    }
                },
            }
        }
    }

    /// Start walking the feed where the ledger resumes.
    fn open_discovery(&mut self) {
        let controller = self.controller;
        let start = self.ledger.resume_cursor().unwrap_or_default();
        let (tx, rx) = mpsc::channel(1);
        let task = tokio::spawn(discover(
            Arc::clone(&controller.feed),
            start,
            controller.config.discovery.max_attempts.max(1),
            controller.config.fetch.retry.clone(),
            self.halt.clone(),
            tx,
        ));
        self.discovery = Some((task, rx));
    }

    /// Move queued tasks into the pool while both budgets allow:
    /// `in_flight < concurrency` and `counter + in_flight < target`.
    fn admit(&mut self) {
        let concurrency = self.controller.config.fetch.concurrency.max(1) as u64;
        while !self.queue.is_empty() {
            let in_flight = self.pool.in_flight() as u64;
            if in_flight >= concurrency || self.counter.get() + in_flight >= self.counter.target() {
                break;
            }
            let Some(task) = self.queue.pop_front() else {
                break;
            };
            if let Err(e) = self.pool.submit(task) {
                warn!("Skipping task: {}", e);
            }
        }
    }

    fn is_duplicate(&self, id: &RecordId) -> bool {
        self.seen.contains(id)
            || self.pool.is_in_flight(id)
            || self.controller.store.contains(id)
    }

    async fn evaluate(&mut self, cursor: FeedCursor, page: FeedPage) {
        self.summary.pages += 1;
        let total = page.records.len();
        let page_id = self.ledger.open_page(cursor.clone(), page.next);
        let mut accepted = 0;

        for record in page.records {
            if let Verdict::Rejected(reason) = self.controller.classifier.classify(&record) {
                *self.summary.rejected.entry(reason).or_default() += 1;
                self.record_rejection(record).await;
                continue;
            }

            let Some(id) = record.id() else {
                continue;
            };
            if self.is_duplicate(&id) {
                self.summary.duplicates += 1;
                continue;
            }
            let Some(pdf_url) = record.resolved_pdf_url().map(String::from) else {
                continue;
            };

            let file_name = self
                .controller
                .config
                .storage
                .naming
                .file_name(&id, &record.title);
            self.seen.insert(id.clone());
            self.ledger.hold(page_id);
            self.page_of.insert(id.clone(), page_id);
            self.queue.push_back(DownloadTask {
                id,
                pdf_url,
                file_name,
                record,
            });
            accepted += 1;
        }

        debug!(cursor = %cursor, total, accepted, "Evaluated feed page");
        self.persist_cursor();
    }

    async fn record_rejection(&mut self, record: Record) {
        if !self.controller.config.storage.record_rejections {
            return;
        }
        let Some(id) = record.id() else {
            return;
        };
        if self.controller.store.outcome(&id).is_some() || !self.seen.insert(id.clone()) {
            return;
        }
        if let Err(e) = self.index.record(ProgressEntry::rejected(id, record)).await {
            warn!("Failed to record rejection: {}", e);
        }
    }

    async fn settle(&mut self, report: TaskReport) {
        let TaskReport {
            task,
            outcome,
            attempts,
        } = report;
        let id = task.id.clone();

        match outcome {
            FetchOutcome::Succeeded {
                path,
                bytes,
                reused,
            } => {
                let entry = ProgressEntry::succeeded(task.id, task.record, task.pdf_url, path);
                match self.index.record(entry).await {
                    Ok(()) => {
                        let count = self.counter.increment();
                        if reused {
                            self.summary.reused += 1;
                        } else {
                            self.summary.fetched += 1;
                        }
                        info!(
                            id = %id,
                            bytes,
                            reused,
                            attempts,
                            succeeded = count,
                            target = self.counter.target(),
                            "Download recorded"
                        );
                        if self.counter.is_reached() {
                            info!(succeeded = count, "Target reached, halting discovery");
                            self.halt.cancel();
                        }
                    }
                    Err(e) => {
                        error!(id = %id, "Download could not be recorded: {}", e);
                        self.summary.failed += 1;
                    }
                }
            }
            FetchOutcome::Failed { reason, retryable } => {
                debug!(id = %id, attempts, retryable, reason = %reason, "Download failed");
                self.summary.failed += 1;
                self.record_failure(task).await;
            }
        }

        self.release(&id);
    }

    async fn record_failure(&mut self, task: DownloadTask) {
        let entry = ProgressEntry::failed(task.id, task.record, task.pdf_url);
        if let Err(e) = self.index.record(entry).await {
            warn!("Failed to record failure: {}", e);
        }
    }

    fn release(&mut self, id: &RecordId) {
        if let Some(page) = self.page_of.remove(id) {
            self.ledger.release(page);
            self.persist_cursor();
        }
    }

    /// Write the resume cursor when it moved. Failures only cost re-reading
    /// pages on the next run.
    fn persist_cursor(&mut self) {
        let cursor = self.ledger.resume_cursor();
        if cursor == self.saved_cursor {
            return;
        }

        let feed = self.controller.feed.name();
        let result = match &cursor {
            Some(cursor) => self.job_state.save(feed, cursor),
            None => self.job_state.clear(),
        };
        match result {
            Ok(()) => self.saved_cursor = cursor,
            Err(e) => warn!("Failed to persist discovery cursor: {}", e),
        }
    }

    /// Drain in-flight work, record what was cut off, and produce the summary.
    async fn finish(mut self, status: RunStatus) -> RunSummary {
        self.halt.cancel();
        if let Some((task, _)) = self.discovery.take() {
            task.abort();
            let _ = task.await;
        }

        let grace = Duration::from_secs(self.controller.config.fetch.drain_timeout_secs);
        let drained = self.pool.drain(grace).await;
        for report in drained.completed {
            self.settle(report).await;
        }
        for task in drained.abandoned {
            warn!(id = %task.id, url = %task.pdf_url, "Download abandoned");
            self.summary.abandoned += 1;
            let id = task.id.clone();
            self.record_failure(task).await;
            self.release(&id);
        }
        self.persist_cursor();

        self.summary.succeeded = self.counter.get();
        self.summary.status = if self.counter.is_reached() {
            RunStatus::TargetReached
        } else {
            status
        };

        let pool = self.pool.status();
        let summary = &self.summary;
        info!(
            status = %summary.status,
            target = summary.target,
            succeeded = summary.succeeded,
            succeeded_before = summary.succeeded_before,
            fetched = summary.fetched,
            reused = summary.reused,
            retried = summary.retried,
            rejected = summary.rejected_total(),
            duplicates = summary.duplicates,
            failed = summary.failed,
            abandoned = summary.abandoned,
            feed_errors = summary.feed_errors,
            pages = summary.pages,
            download_retries = pool.retries,
            max_concurrent = pool.max_concurrent,
            "Run finished"
        );

        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Outcome;
    use crate::testing::{fixtures, MemoryProgressStore, MockFeed, MockReply, MockTransport};
    use tempfile::TempDir;

    fn pages(ranges: &[std::ops::Range<u32>]) -> Vec<Vec<Record>> {
        ranges
            .iter()
            .map(|r| r.clone().map(fixtures::record).collect())
            .collect()
    }

    fn controller(
        config: Config,
        feed: Arc<MockFeed>,
        transport: Arc<MockTransport>,
        store: Arc<MemoryProgressStore>,
    ) -> AcquisitionController {
        let classifier = fixtures::classifier(&config);
        AcquisitionController::new(config, feed, transport, store).with_classifier(classifier)
    }

    fn success(n: u32) -> ProgressEntry {
        let task = fixtures::download_task(n);
        ProgressEntry::succeeded(task.id, task.record, task.pdf_url, task.file_name)
    }

    fn failure(n: u32) -> ProgressEntry {
        let task = fixtures::download_task(n);
        ProgressEntry::failed(task.id, task.record, task.pdf_url)
    }

    fn payloads_on_disk(config: &Config) -> usize {
        std::fs::read_dir(config.storage.payload_dir.join("pdfs"))
            .map(|dir| dir.count())
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_stops_at_exact_target() {
        let dir = TempDir::new().unwrap();
        let mut config = fixtures::config(dir.path());
        config.run.target = 7;
        let feed = Arc::new(MockFeed::new(pages(&[0..5, 5..10, 10..15])));
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(MemoryProgressStore::new());

        let summary = controller(config, feed, transport.clone(), store.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::TargetReached);
        assert_eq!(summary.succeeded, 7);
        assert_eq!(summary.fetched, 7);
        assert_eq!(transport.total_calls(), 7);
        assert_eq!(store.succeeded_count(), 7);
        assert!(transport.peak_concurrency() <= 4);
    }

    #[tokio::test]
    async fn test_already_complete_issues_no_requests() {
        let dir = TempDir::new().unwrap();
        let mut config = fixtures::config(dir.path());
        config.run.target = 2;
        let feed = Arc::new(MockFeed::new(pages(&[10..20])));
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(MemoryProgressStore::with_entries(vec![
            success(1),
            success(2),
            success(3),
        ]));

        let summary = controller(config, feed.clone(), transport.clone(), store)
            .run()
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::AlreadyComplete);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(feed.call_count(), 0);
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_duplicates_are_skipped() {
        let dir = TempDir::new().unwrap();
        let config = fixtures::config(dir.path());
        let feed = Arc::new(MockFeed::new(vec![
            vec![fixtures::record(1), fixtures::record(2)],
            vec![fixtures::record(1), fixtures::record(3), fixtures::record(4)],
        ]));
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(MemoryProgressStore::with_entries(vec![success(4)]));

        let summary = controller(config, feed, transport.clone(), store.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::SourceExhausted);
        assert!(summary.exhausted());
        assert_eq!(summary.duplicates, 2);
        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.succeeded, 4);
        assert_eq!(transport.call_count(&fixtures::pdf_url(1)), 1);
        assert_eq!(transport.call_count(&fixtures::pdf_url(4)), 0);
    }

    #[tokio::test]
    async fn test_failed_download_is_recorded_and_retried_next_run() {
        let dir = TempDir::new().unwrap();
        let config = fixtures::config(dir.path());
        let feed = Arc::new(MockFeed::new(pages(&[1..4])));
        let transport = Arc::new(
            MockTransport::new().with_replies(&fixtures::pdf_url(2), vec![MockReply::Status(404)]),
        );
        let store = Arc::new(MemoryProgressStore::new());

        let summary = controller(config.clone(), feed, transport.clone(), store.clone())
            .run()
            .await
            .unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(store.outcome(&fixtures::record_id(2)), Some(Outcome::Failed));

        // The link works now; the backlog picks it up without the feed.
        transport.set_replies(&fixtures::pdf_url(2), vec![MockReply::Pdf]);
        let feed = Arc::new(MockFeed::new(vec![]));
        let summary = controller(config, feed, transport.clone(), store.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.retried, 1);
        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(store.outcome(&fixtures::record_id(2)), Some(Outcome::Succeeded));
    }

    #[tokio::test]
    async fn test_feed_errors_end_discovery_and_keep_cursor() {
        let dir = TempDir::new().unwrap();
        let config = fixtures::config(dir.path());
        let feed = Arc::new(
            MockFeed::new(pages(&[1..3, 3..5])).with_failures(1, vec![500, 500, 500, 500]),
        );
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(MemoryProgressStore::new());

        let summary = controller(config.clone(), feed.clone(), transport, store)
            .run()
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::SourceExhausted);
        assert_eq!(summary.feed_errors, 1);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(feed.call_count(), 4);

        let saved = JobStateStore::new(&config.storage.job_dir).load("mock").unwrap();
        assert_eq!(saved, Some(MockFeed::cursor(1)));
    }

    #[tokio::test]
    async fn test_exhausted_feed_clears_cursor() {
        let dir = TempDir::new().unwrap();
        let config = fixtures::config(dir.path());
        let feed = Arc::new(MockFeed::new(pages(&[1..3, 3..5])));
        let store = Arc::new(MemoryProgressStore::new());

        let summary = controller(config.clone(), feed, Arc::new(MockTransport::new()), store)
            .run()
            .await
            .unwrap();

        assert_eq!(summary.pages, 2);
        assert_eq!(summary.status, RunStatus::SourceExhausted);
        let saved = JobStateStore::new(&config.storage.job_dir).load("mock").unwrap();
        assert_eq!(saved, None);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_run() {
        let dir = TempDir::new().unwrap();
        let config = fixtures::config(dir.path());
        let feed = Arc::new(MockFeed::new(pages(&[1..3, 3..5])).with_hang(1));
        let store = Arc::new(MemoryProgressStore::new());
        let controller = controller(config, feed, Arc::new(MockTransport::new()), store);

        let token = controller.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });
        let summary = controller.run().await.unwrap();

        assert_eq!(summary.status, RunStatus::Interrupted);
        assert_eq!(summary.succeeded, 2);
    }

    #[tokio::test]
    async fn test_rejections_are_counted_and_optionally_recorded() {
        let dir = TempDir::new().unwrap();
        let mut config = fixtures::config(dir.path());
        config.storage.record_rejections = true;

        let mut no_pdf = fixtures::record(2);
        no_pdf.pdf_url = None;
        let mut off_topic = fixtures::record(3);
        off_topic.title = "Analisis struktur baja".to_string();
        off_topic.abstract_text = "Penelitian ini membahas kekuatan baja pada jembatan.".to_string();
        let feed = Arc::new(MockFeed::new(vec![vec![fixtures::record(1), no_pdf, off_topic]]));
        let store = Arc::new(MemoryProgressStore::new());

        let summary = controller(config, feed, Arc::new(MockTransport::new()), store.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.rejected_total(), 2);
        assert_eq!(summary.rejected.get(&crate::classifier::RejectReason::NoPdf), Some(&1));
        assert_eq!(summary.rejected.get(&crate::classifier::RejectReason::Topic), Some(&1));
        assert_eq!(store.outcome(&fixtures::record_id(3)), Some(Outcome::Rejected));
        assert_eq!(summary.succeeded, 1);
    }

    #[tokio::test]
    async fn test_unrecorded_success_is_not_counted() {
        let dir = TempDir::new().unwrap();
        let config = fixtures::config(dir.path());
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(MemoryProgressStore::new());
        store.fail_next_record(fixtures::record_id(2));

        let feed = Arc::new(MockFeed::new(pages(&[1..5])));
        let summary = controller(config.clone(), feed, transport.clone(), store.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::SourceExhausted);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(store.succeeded_count(), 3);
        assert_eq!(store.outcome(&fixtures::record_id(2)), None);
        assert!(config
            .storage
            .payload_dir
            .join(fixtures::download_task(2).file_name)
            .exists());

        // The payload left on disk is credited on the next run without a request.
        let feed = Arc::new(MockFeed::new(pages(&[1..5])));
        let summary = controller(config, feed, transport.clone(), store.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.reused, 1);
        assert_eq!(summary.duplicates, 3);
        assert_eq!(summary.succeeded, 4);
        assert_eq!(transport.call_count(&fixtures::pdf_url(2)), 1);
    }

    #[tokio::test]
    async fn test_abandoned_downloads_are_recorded_as_failed() {
        let dir = TempDir::new().unwrap();
        let mut config = fixtures::config(dir.path());
        config.fetch.drain_timeout_secs = 0;
        let feed = Arc::new(MockFeed::new(pages(&[1..5])));
        let slow = Arc::new(MockTransport::new().with_delay(Duration::from_secs(30)));
        let store = Arc::new(MemoryProgressStore::new());
        let interrupted = controller(config.clone(), feed, slow.clone(), store.clone());

        let token = interrupted.cancel_token();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            token.cancel();
        });
        let summary = interrupted.run().await.unwrap();

        assert_eq!(summary.status, RunStatus::Interrupted);
        assert_eq!(summary.abandoned, 4);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(slow.total_calls(), 4);
        for n in 1..5 {
            assert_eq!(store.outcome(&fixtures::record_id(n)), Some(Outcome::Failed));
        }
        assert_eq!(payloads_on_disk(&config), 0);

        let feed = Arc::new(MockFeed::new(vec![]));
        let transport = Arc::new(MockTransport::new());
        let summary = controller(config.clone(), feed, transport, store.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(summary.retried, 4);
        assert_eq!(summary.fetched, 4);
        assert_eq!(store.succeeded_count(), 4);
        assert_eq!(payloads_on_disk(&config), 4);
    }

    #[tokio::test]
    async fn test_backlog_covering_target_leaves_feed_unread() {
        let dir = TempDir::new().unwrap();
        let mut config = fixtures::config(dir.path());
        config.run.target = 3;
        let feed = Arc::new(MockFeed::new(pages(&[10..15])));
        let store = Arc::new(MemoryProgressStore::with_entries(vec![
            success(1),
            success(2),
            failure(3),
        ]));

        let summary = controller(config, feed.clone(), Arc::new(MockTransport::new()), store)
            .run()
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::TargetReached);
        assert_eq!(summary.retried, 1);
        assert_eq!(summary.fetched, 1);
        assert_eq!(feed.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_backlog_falls_back_to_feed() {
        let dir = TempDir::new().unwrap();
        let mut config = fixtures::config(dir.path());
        config.run.target = 3;
        let feed = Arc::new(MockFeed::new(pages(&[10..15])));
        let transport = Arc::new(
            MockTransport::new().with_replies(&fixtures::pdf_url(3), vec![MockReply::Status(404)]),
        );
        let store = Arc::new(MemoryProgressStore::with_entries(vec![
            success(1),
            success(2),
            failure(3),
        ]));

        let summary = controller(config, feed.clone(), transport.clone(), store)
            .run()
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::TargetReached);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.fetched, 1);
        assert!(feed.call_count() >= 1);
        assert_eq!(transport.call_count(&fixtures::pdf_url(10)), 1);
    }
}
