//! Payload files on disk.
//!
//! Payloads are written to a `.part` sibling and renamed into place once
//! synced, so a final name never holds a truncated file.

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::record::PAYLOAD_SUBDIR;

use super::types::FetchError;

const PART_SUFFIX: &str = "part";

/// Create the payload directory (and its PDF subdirectory).
pub async fn ensure_payload_dir(payload_dir: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(payload_dir.join(PAYLOAD_SUBDIR)).await
}

/// Whether a non-empty file already sits at `path`.
pub async fn payload_exists(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// Remove `.part` files left behind by an interrupted run. Returns how many
/// were removed.
pub async fn sweep_partials(payload_dir: &Path) -> std::io::Result<usize> {
    let mut removed = 0;
    for dir in [payload_dir.to_path_buf(), payload_dir.join(PAYLOAD_SUBDIR)] {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_part = path.extension().is_some_and(|ext| ext == PART_SUFFIX);
            if is_part && entry.file_type().await?.is_file() {
                tokio::fs::remove_file(&path).await?;
                debug!(path = %path.display(), "Removed stale partial payload");
                removed += 1;
            }
        }
    }
    Ok(removed)
}

fn part_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".");
    name.push(PART_SUFFIX);
    PathBuf::from(name)
}

/// Deletes the partial file unless disarmed, including when the owning
/// future is aborted mid-write.
struct PartFile {
    path: PathBuf,
    armed: bool,
}

impl PartFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), "Failed to remove partial payload: {}", e);
                }
            }
        }
    }
}

/// Durably write `body` to `target`. Returns the byte count.
pub async fn write_payload(target: &Path, body: &[u8]) -> Result<u64, FetchError> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FetchError::write(parent, e))?;
    }

    let part = part_path(target);
    let mut guard = PartFile::new(part.clone());

    let mut file = tokio::fs::File::create(&part)
        .await
        .map_err(|e| FetchError::write(&part, e))?;
    file.write_all(body)
        .await
        .map_err(|e| FetchError::write(&part, e))?;
    file.sync_all()
        .await
        .map_err(|e| FetchError::write(&part, e))?;
    drop(file);

    tokio::fs::rename(&part, target)
        .await
        .map_err(|e| FetchError::write(target, e))?;
    guard.disarm();

    Ok(body.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_payload_leaves_no_part_file() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("pdfs/a.pdf");

        let bytes = write_payload(&target, b"%PDF-1.7 data").await.unwrap();
        assert_eq!(bytes, 13);
        assert_eq!(std::fs::read(&target).unwrap(), b"%PDF-1.7 data");
        assert!(!part_path(&target).exists());
        assert!(payload_exists(&target).await);
    }

    #[tokio::test]
    async fn test_payload_exists_ignores_empty_files() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("empty.pdf");
        std::fs::write(&target, b"").unwrap();
        assert!(!payload_exists(&target).await);
        assert!(!payload_exists(&dir.path().join("missing.pdf")).await);
    }

    #[test]
    fn test_part_guard_removes_file_on_drop() {
        let dir = TempDir::new().unwrap();
        let part = dir.path().join("x.pdf.part");
        std::fs::write(&part, b"partial").unwrap();
        drop(PartFile::new(part.clone()));
        assert!(!part.exists());

        std::fs::write(&part, b"partial").unwrap();
        let mut guard = PartFile::new(part.clone());
        guard.disarm();
        drop(guard);
        assert!(part.exists());
    }

    #[tokio::test]
    async fn test_sweep_partials() {
        let dir = TempDir::new().unwrap();
        ensure_payload_dir(dir.path()).await.unwrap();
        std::fs::write(dir.path().join("pdfs/a.pdf.part"), b"x").unwrap();
        std::fs::write(dir.path().join("b.pdf.part"), b"x").unwrap();
        std::fs::write(dir.path().join("pdfs/c.pdf"), b"%PDF").unwrap();

        assert_eq!(sweep_partials(dir.path()).await.unwrap(), 2);
        assert!(dir.path().join("pdfs/c.pdf").exists());
        assert!(!dir.path().join("pdfs/a.pdf.part").exists());
    }

    #[tokio::test]
    async fn test_sweep_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert_eq!(sweep_partials(&dir.path().join("nope")).await.unwrap(), 0);
    }
}
