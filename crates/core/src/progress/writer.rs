use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::{IndexError, ProgressEntry, ProgressStore};

/// A pending append with its acknowledgement channel.
pub struct IndexCommand {
    entry: ProgressEntry,
    ack: oneshot::Sender<Result<(), IndexError>>,
}

/// Handle for recording outcomes.
///
/// Cheap to clone. Every entry goes through the single [`IndexWriter`] task,
/// so appends are never interleaved.
#[derive(Clone)]
pub struct IndexHandle {
    tx: mpsc::Sender<IndexCommand>,
}

impl IndexHandle {
    pub fn new(tx: mpsc::Sender<IndexCommand>) -> Self {
        Self { tx }
    }

    /// Record an entry and wait until it is durable.
    pub async fn record(&self, entry: ProgressEntry) -> Result<(), IndexError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(IndexCommand { entry, ack })
            .await
            .map_err(|_| IndexError::WriterClosed)?;
        done.await.map_err(|_| IndexError::WriterClosed)?
    }
}

/// Background task that owns all writes to the progress store.
pub struct IndexWriter {
    rx: mpsc::Receiver<IndexCommand>,
    store: Arc<dyn ProgressStore>,
}

impl IndexWriter {
    pub fn new(rx: mpsc::Receiver<IndexCommand>, store: Arc<dyn ProgressStore>) -> Self {
        Self { rx, store }
    }

    /// Run until every handle is dropped.
    ///
    /// Spawn with `tokio::spawn(writer.run())`.
    pub async fn run(mut self) {
        tracing::debug!(store = self.store.name(), "Index writer started");

        while let Some(IndexCommand { entry, ack }) = self.rx.recv().await {
            let result = self.store.record(&entry);
            if let Err(e) = &result {
                tracing::error!(id = %entry.id, outcome = %entry.outcome, "Failed to record index entry: {}", e);
            }
            // The caller may have gone away; the row is written either way.
            let _ = ack.send(result);
        }

        tracing::debug!("Index writer shutting down");
    }
}

/// Create the index writer pair.
///
/// Returns the handle (clone freely) and the writer to spawn.
pub fn create_index_system(
    store: Arc<dyn ProgressStore>,
    buffer_size: usize,
) -> (IndexHandle, IndexWriter) {
    let (tx, rx) = mpsc::channel(buffer_size.max(1));
    (IndexHandle::new(tx), IndexWriter::new(rx, store))
}
