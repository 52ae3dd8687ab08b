//! Bounded-concurrency download pool.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{FetchConfig, RetryConfig};
use crate::record::{DownloadTask, RecordId};

use super::storage::{payload_exists, write_payload};
use super::traits::FetchTransport;
use super::types::{FetchError, FetchOutcome, Payload, PoolError, PoolStatus, TaskReport};

/// Tracks statistics for the pool.
#[derive(Default)]
struct PoolStats {
    active: AtomicU64,
    succeeded: AtomicU64,
    reused: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
}

/// Everything a spawned download needs.
#[derive(Clone)]
struct Worker {
    transport: Arc<dyn FetchTransport>,
    payload_dir: PathBuf,
    timeout: Duration,
    retry: RetryConfig,
    semaphore: Arc<Semaphore>,
    stats: Arc<PoolStats>,
}

/// What `drain` left behind.
#[derive(Debug, Default)]
pub struct DrainResult {
    /// Tasks that settled within the grace period.
    pub completed: Vec<TaskReport>,
    /// Tasks cut off when the grace period ran out.
    pub abandoned: Vec<DownloadTask>,
}

/// Runs download tasks under a fixed concurrency bound.
///
/// Owned by the controller; completions are pulled with
/// [`next_completed`](Self::next_completed).
pub struct FetchPool {
    worker: Worker,
    max_concurrent: usize,
    tasks: JoinSet<TaskReport>,
    in_flight: HashMap<RecordId, DownloadTask>,
}

impl FetchPool {
    pub fn new(
        transport: Arc<dyn FetchTransport>,
        payload_dir: impl Into<PathBuf>,
        config: &FetchConfig,
    ) -> Self {
        let max_concurrent = config.concurrency.max(1);
        Self {
            worker: Worker {
                transport,
                payload_dir: payload_dir.into(),
                timeout: Duration::from_secs(config.timeout_secs.max(1)),
                retry: config.retry.clone(),
                semaphore: Arc::new(Semaphore::new(max_concurrent)),
                stats: Arc::new(PoolStats::default()),
            },
            max_concurrent,
            tasks: JoinSet::new(),
            in_flight: HashMap::new(),
        }
    }

    /// Start a download in the background.
    pub fn submit(&mut self, task: DownloadTask) -> Result<(), PoolError> {
        if self.in_flight.contains_key(&task.id) {
            return Err(PoolError::AlreadyInFlight(task.id));
        }
        debug!(id = %task.id, url = %task.pdf_url, "Submitting download");
        self.in_flight.insert(task.id.clone(), task.clone());
        let worker = self.worker.clone();
        self.tasks.spawn(async move { worker.run(task).await });
        Ok(())
    }

    /// Number of submitted tasks not yet collected.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_in_flight(&self, id: &RecordId) -> bool {
        self.in_flight.contains_key(id)
    }

    /// Wait for the next task to settle. `None` when nothing is in flight.
    pub async fn next_completed(&mut self) -> Option<TaskReport> {
        loop {
            match self.tasks.join_next().await? {
                Ok(report) => {
                    self.in_flight.remove(&report.task.id);
                    return Some(report);
                }
                // The identity stays in `in_flight` and is reported as
                // abandoned by `drain`.
                Err(e) => warn!("Download task ended abnormally: {}", e),
            }
        }
    }

    /// Give in-flight tasks up to `grace` to settle, then abort the rest.
    ///
    /// Aborted tasks remove their partial files.
    pub async fn drain(&mut self, grace: Duration) -> DrainResult {
        let mut result = DrainResult::default();
        if !self.tasks.is_empty() {
            info!(in_flight = self.tasks.len(), grace_secs = grace.as_secs_f64(), "Draining downloads");
        }

        let deadline = tokio::time::Instant::now() + grace;
        while !self.tasks.is_empty() {
            match tokio::time::timeout_at(deadline, self.next_completed()).await {
                Ok(Some(report)) => result.completed.push(report),
                Ok(None) => break,
                Err(_) => break,
            }
        }

        self.tasks.shutdown().await;
        result.abandoned = self.in_flight.drain().map(|(_, task)| task).collect();
        if !result.abandoned.is_empty() {
            warn!(abandoned = result.abandoned.len(), "Abandoned downloads after drain timeout");
        }
        result
    }

    pub fn status(&self) -> PoolStatus {
        let stats = &self.worker.stats;
        PoolStatus {
            active: stats.active.load(Ordering::Relaxed) as usize,
            max_concurrent: self.max_concurrent,
            in_flight: self.tasks.len(),
            succeeded: stats.succeeded.load(Ordering::Relaxed),
            reused: stats.reused.load(Ordering::Relaxed),
            failed: stats.failed.load(Ordering::Relaxed),
            retries: stats.retries.load(Ordering::Relaxed),
        }
    }
}

impl Worker {
    async fn run(self, task: DownloadTask) -> TaskReport {
        // The semaphore is never closed.
        let _permit = self.semaphore.clone().acquire_owned().await.ok();
        self.stats.active.fetch_add(1, Ordering::Relaxed);

        let (outcome, attempts) = self.download(&task).await;

        self.stats.active.fetch_sub(1, Ordering::Relaxed);
        match &outcome {
            FetchOutcome::Succeeded { reused: true, .. } => {
                self.stats.reused.fetch_add(1, Ordering::Relaxed);
            }
            FetchOutcome::Succeeded { .. } => {
                self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            FetchOutcome::Failed { .. } => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
            }
        }

        TaskReport {
            task,
            outcome,
            attempts,
        }
    }

    async fn download(&self, task: &DownloadTask) -> (FetchOutcome, u32) {
        let target = self.payload_dir.join(&task.file_name);

        if payload_exists(&target).await {
            let bytes = tokio::fs::metadata(&target)
                .await
                .map(|m| m.len())
                .unwrap_or_default();
            debug!(id = %task.id, path = %target.display(), "Payload already on disk");
            return (
                FetchOutcome::Succeeded {
                    path: task.file_name.clone(),
                    bytes,
                    reused: true,
                },
                0,
            );
        }

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(task, &target).await {
                Ok(bytes) => {
                    debug!(id = %task.id, bytes, attempt, "Downloaded payload");
                    return (
                        FetchOutcome::Succeeded {
                            path: task.file_name.clone(),
                            bytes,
                            reused: false,
                        },
                        attempt,
                    );
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        id = %task.id,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Download attempt failed, retrying: {}",
                        e
                    );
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(id = %task.id, url = %task.pdf_url, attempt, "Download failed: {}", e);
                    return (
                        FetchOutcome::Failed {
                            reason: e.to_string(),
                            retryable: e.is_retryable(),
                        },
                        attempt,
                    );
                }
            }
        }
    }

    async fn attempt(&self, task: &DownloadTask, target: &std::path::Path) -> Result<u64, FetchError> {
        let payload = tokio::time::timeout(self.timeout, self.transport.get(&task.pdf_url, self.timeout))
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))??;
        validate(&task.pdf_url, &payload)?;
        write_payload(target, &payload.body).await
    }
}

fn path_ends_with_pdf(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    path.to_ascii_lowercase().ends_with(".pdf")
}

/// A payload is accepted when it is non-empty and either announced as a PDF,
/// addressed as one, or starts with the PDF magic bytes.
fn validate(url: &str, payload: &Payload) -> Result<(), FetchError> {
    if payload.body.is_empty() {
        return Err(FetchError::EmptyBody);
    }

    let content_type = payload
        .content_type
        .as_deref()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if content_type.contains("pdf")
        || path_ends_with_pdf(url)
        || path_ends_with_pdf(&payload.final_url)
        || payload.body.starts_with(b"%PDF")
    {
        return Ok(());
    }

    Err(FetchError::InvalidContentType(if content_type.is_empty() {
        "unknown".to_string()
    } else {
        content_type
    }))
}
