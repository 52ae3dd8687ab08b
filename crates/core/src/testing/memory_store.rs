//! In-memory progress store for testing.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::progress::{IndexError, LoadReport, Outcome, ProgressEntry, ProgressStore};
use crate::record::RecordId;

#[derive(Debug, Default)]
struct MemoryState {
    loaded: bool,
    /// Every accepted entry, in append order.
    log: Vec<ProgressEntry>,
    resolved: HashMap<RecordId, Outcome>,
    /// Identities whose next `record` fails, for error-path tests.
    failing: Vec<RecordId>,
}

impl MemoryState {
    fn apply(&mut self, entry: &ProgressEntry) {
        if self.resolved.get(&entry.id) != Some(&Outcome::Succeeded) {
            self.resolved.insert(entry.id.clone(), entry.outcome);
        }
    }
}

/// [`ProgressStore`] kept in memory, with the same resolution rules as the
/// CSV index: successes are sticky, otherwise the latest outcome wins.
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    state: Mutex<MemoryState>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from entries "already on disk"; they take effect on `load()`.
    pub fn with_entries(entries: Vec<ProgressEntry>) -> Self {
        let store = Self::new();
        store.lock().log = entries;
        store
    }

    /// Make the next `record` for `id` fail with an I/O error.
    pub fn fail_next_record(&self, id: RecordId) {
        self.lock().failing.push(id);
    }

    /// All entries written so far, in order.
    pub fn entries(&self) -> Vec<ProgressEntry> {
        self.lock().log.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ProgressStore for MemoryProgressStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn load(&self) -> Result<LoadReport, IndexError> {
        let mut state = self.lock();
        let log = state.log.clone();
        state.resolved.clear();
        for entry in &log {
            state.apply(entry);
        }
        state.loaded = true;

        let mut report = LoadReport {
            rows: log.len(),
            ..Default::default()
        };
        for outcome in state.resolved.values() {
            match outcome {
                Outcome::Succeeded => report.succeeded += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::Rejected => report.rejected += 1,
            }
        }
        Ok(report)
    }

    fn outcome(&self, id: &RecordId) -> Option<Outcome> {
        self.lock().resolved.get(id).copied()
    }

    fn record(&self, entry: &ProgressEntry) -> Result<(), IndexError> {
        let mut state = self.lock();
        if !state.loaded {
            return Err(IndexError::NotLoaded);
        }
        if state.resolved.get(&entry.id) == Some(&Outcome::Succeeded) {
            return Err(IndexError::AlreadySucceeded(entry.id.clone()));
        }
        if let Some(pos) = state.failing.iter().position(|id| *id == entry.id) {
            state.failing.remove(pos);
            return Err(IndexError::Io(std::io::Error::other("injected write failure")));
        }
        state.apply(entry);
        state.log.push(entry.clone());
        Ok(())
    }

    fn succeeded_count(&self) -> u64 {
        self.lock()
            .resolved
            .values()
            .filter(|o| **o == Outcome::Succeeded)
            .count() as u64
    }

    fn retry_candidates(&self) -> Vec<ProgressEntry> {
        let state = self.lock();
        let mut latest: HashMap<&RecordId, &ProgressEntry> = HashMap::new();
        let mut order = Vec::new();
        for entry in &state.log {
            if latest.insert(&entry.id, entry).is_none() {
                order.push(&entry.id);
            }
        }
        order
            .into_iter()
            .filter(|id| state.resolved.get(*id) == Some(&Outcome::Failed))
            .filter_map(|id| latest.get(id).map(|e| (*e).clone()))
            .filter(|e| !e.pdf_url.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn test_success_is_sticky() {
        let store = MemoryProgressStore::new();
        store.load().unwrap();
        let task = fixtures::download_task(1);

        store
            .record(&ProgressEntry::succeeded(
                task.id.clone(),
                task.record.clone(),
                task.pdf_url.clone(),
                task.file_name.clone(),
            ))
            .unwrap();
        let err = store
            .record(&ProgressEntry::failed(task.id.clone(), task.record, task.pdf_url))
            .unwrap_err();

        assert!(matches!(err, IndexError::AlreadySucceeded(_)));
        assert_eq!(store.outcome(&task.id), Some(Outcome::Succeeded));
        assert_eq!(store.succeeded_count(), 1);
    }

    #[test]
    fn test_seeded_entries_resolve_on_load() {
        let failed = fixtures::download_task(1);
        let store = MemoryProgressStore::with_entries(vec![ProgressEntry::failed(
            failed.id.clone(),
            failed.record,
            failed.pdf_url,
        )]);
        assert_eq!(store.outcome(&failed.id), None);

        let report = store.load().unwrap();
        assert_eq!(report.failed, 1);
        assert!(!store.contains(&failed.id));
        assert_eq!(store.retry_candidates().len(), 1);
    }
}
