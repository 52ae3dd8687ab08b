//! Resumable discovery position, persisted in the job state directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use super::types::FeedCursor;

const CURSOR_FILE: &str = "cursor.json";

#[derive(Debug, Error)]
pub enum JobStateError {
    #[error("Job state I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode job state: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Where the discovery walk should resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobState {
    /// Name of the feed the cursor belongs to.
    pub feed: String,
    pub cursor: FeedCursor,
    pub updated_at: DateTime<Utc>,
}

impl JobState {
    pub fn new(feed: impl Into<String>, cursor: FeedCursor) -> Self {
        Self {
            feed: feed.into(),
            cursor,
            updated_at: Utc::now(),
        }
    }
}

/// `cursor.json` inside the job state directory.
pub struct JobStateStore {
    dir: PathBuf,
}

impl JobStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(CURSOR_FILE)
    }

    /// Saved cursor for `feed`, if any.
    ///
    /// An unreadable file or a cursor from another feed is ignored with a
    /// warning; the walk then starts from the beginning and the progress
    /// index filters what was already handled.
    pub fn load(&self, feed: &str) -> Result<Option<FeedCursor>, JobStateError> {
        let path = self.path();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<JobState>(&text) {
            Ok(state) if state.feed == feed => {
                debug!(cursor = %state.cursor, "Resuming discovery");
                Ok(Some(state.cursor))
            }
            Ok(state) => {
                warn!(saved = %state.feed, current = %feed, "Ignoring job state from another feed");
                Ok(None)
            }
            Err(e) => {
                warn!(path = %path.display(), "Ignoring unreadable job state: {}", e);
                Ok(None)
            }
        }
    }

    /// Persist the cursor atomically (temp file + rename).
    pub fn save(&self, feed: &str, cursor: &FeedCursor) -> Result<(), JobStateError> {
        std::fs::create_dir_all(&self.dir)?;
        let state = JobState::new(feed, cursor.clone());
        let path = self.path();
        let tmp = path.with_extension("json.tmp");
        write_synced(&tmp, &serde_json::to_vec_pretty(&state)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Forget the saved cursor so the next run walks the feed from the start.
    pub fn clear(&self) -> Result<(), JobStateError> {
        match std::fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = std::fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_state() {
        let dir = TempDir::new().unwrap();
        let store = JobStateStore::new(dir.path().join("jobstate"));
        assert_eq!(store.load("doaj").unwrap(), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = JobStateStore::new(dir.path().join("jobstate"));
        store.save("doaj", &FeedCursor::new("2:5")).unwrap();
        assert_eq!(store.load("doaj").unwrap(), Some(FeedCursor::new("2:5")));
        assert!(!store.path().with_extension("json.tmp").exists());

        store.save("doaj", &FeedCursor::new("3:1")).unwrap();
        assert_eq!(store.load("doaj").unwrap(), Some(FeedCursor::new("3:1")));
    }

    #[test]
    fn test_other_feed_is_ignored() {
        let dir = TempDir::new().unwrap();
        let store = JobStateStore::new(dir.path());
        store.save("mock", &FeedCursor::new("7")).unwrap();
        assert_eq!(store.load("doaj").unwrap(), None);
    }

    #[test]
    fn test_corrupt_state_is_ignored() {
        let dir = TempDir::new().unwrap();
        let store = JobStateStore::new(dir.path());
        std::fs::write(store.path(), b"{\"feed\": \"doaj\", \"cur").unwrap();
        assert_eq!(store.load("doaj").unwrap(), None);
    }

    #[test]
    fn test_clear() {
        let dir = TempDir::new().unwrap();
        let store = JobStateStore::new(dir.path());
        store.clear().unwrap();
        store.save("doaj", &FeedCursor::new("0:2")).unwrap();
        store.clear().unwrap();
        assert_eq!(store.load("doaj").unwrap(), None);
    }
}
