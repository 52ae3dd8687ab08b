use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::{
    IndexError, IndexRow, LoadReport, Outcome, ProgressEntry, ProgressStore, INDEX_COLUMNS,
};
use crate::record::RecordId;

/// Columns a readable index must have. `outcome` and `recorded_at` may be
/// absent in files that only ever recorded successes.
const REQUIRED_COLUMNS: usize = 8;

/// Append-only CSV index.
///
/// Every row is flushed and synced before `record` returns. Rows are never
/// rewritten, except once to bring an index with an older header up to the
/// current column layout.
pub struct CsvProgressIndex {
    path: PathBuf,
    payload_dir: PathBuf,
    fresh: bool,
    state: Mutex<IndexState>,
}

#[derive(Default)]
struct IndexState {
    loaded: bool,
    entries: HashMap<RecordId, ProgressEntry>,
    /// First-seen order of identities.
    order: Vec<RecordId>,
    succeeded: u64,
    writer: Option<csv::Writer<File>>,
}

impl IndexState {
    /// Fold an entry in: a success is sticky, otherwise the latest entry wins.
    /// A later success for the same identity replaces the earlier one, since
    /// its payload path is the current one.
    fn apply(&mut self, entry: ProgressEntry) {
        match self.entries.get(&entry.id) {
            Some(existing) if existing.outcome == Outcome::Succeeded => {
                if entry.outcome == Outcome::Succeeded {
                    self.entries.insert(entry.id.clone(), entry);
                }
            }
            Some(_) => {
                if entry.outcome == Outcome::Succeeded {
                    self.succeeded += 1;
                }
                self.entries.insert(entry.id.clone(), entry);
            }
            None => {
                if entry.outcome == Outcome::Succeeded {
                    self.succeeded += 1;
                }
                self.order.push(entry.id.clone());
                self.entries.insert(entry.id.clone(), entry);
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.succeeded = 0;
    }

    fn ordered(&self) -> impl Iterator<Item = &ProgressEntry> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }
}

impl CsvProgressIndex {
    /// Create an index over `path`. Payload paths in rows are relative to
    /// `payload_dir`. Nothing is read until [`load`](ProgressStore::load).
    pub fn new(path: impl Into<PathBuf>, payload_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            payload_dir: payload_dir.into(),
            fresh: false,
            state: Mutex::new(IndexState::default()),
        }
    }

    /// Move an unreadable index aside instead of failing the load.
    pub fn with_fresh(mut self, fresh: bool) -> Self {
        self.fresh = fresh;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, IndexState>, IndexError> {
        self.state.lock().map_err(|_| IndexError::Poisoned)
    }

    fn unrecoverable(&self, reason: impl Into<String>) -> IndexError {
        IndexError::Unrecoverable {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    /// Read every row into `state`. Returns whether the header matches the
    /// current layout.
    fn read_rows(
        &self,
        state: &mut IndexState,
        report: &mut LoadReport,
    ) -> Result<bool, IndexError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(self.unrecoverable(e.to_string())),
        };
        let len = file
            .metadata()
            .map_err(|e| self.unrecoverable(e.to_string()))?
            .len();
        if len == 0 {
            return Ok(true);
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(BufReader::new(file));
        let headers = reader
            .headers()
            .map_err(|e| self.unrecoverable(format!("invalid header: {}", e)))?
            .clone();

        if let Some(missing) = INDEX_COLUMNS[..REQUIRED_COLUMNS]
            .iter()
            .find(|col| !headers.iter().any(|h| h.trim() == **col))
        {
            return Err(self.unrecoverable(format!("header lacks column '{}'", missing)));
        }
        let current = headers.iter().eq(INDEX_COLUMNS.iter().copied());
        let strict = headers.iter().any(|h| h.trim() == "outcome");

        let mut raw = csv::StringRecord::new();
        // Byte offset of the last row, if it was corrupt.
        let mut corrupt_tail = None;
        loop {
            let start = reader.position().byte();
            match reader.read_record(&mut raw) {
                Ok(false) => break,
                Ok(true) => {
                    let line = raw.position().map(|p| p.line()).unwrap_or_default();
                    let parsed = raw
                        .deserialize::<IndexRow>(Some(&headers))
                        .map_err(|e| e.to_string())
                        .and_then(|row| row.into_entry(strict));
                    match parsed {
                        Ok(entry) => {
                            report.rows += 1;
                            corrupt_tail = None;
                            state.apply(entry);
                        }
                        Err(reason) => {
                            report.skipped += 1;
                            corrupt_tail = Some(start);
                            warn!(index = %self.path.display(), line, %reason, "Skipping corrupt index row");
                        }
                    }
                }
                Err(e) if e.is_io_error() => return Err(self.unrecoverable(e.to_string())),
                Err(e) => {
                    report.skipped += 1;
                    corrupt_tail = Some(start);
                    warn!(index = %self.path.display(), error = %e, "Skipping corrupt index row");
                }
            }
        }

        if report.rows == 0 && report.skipped > 0 {
            return Err(self.unrecoverable(format!(
                "no valid rows ({} corrupt)",
                report.skipped
            )));
        }

        if let Some(start) = corrupt_tail {
            self.drop_partial_tail(start)?;
        }

        Ok(current)
    }

    /// Cut an unterminated last row. Every acknowledged row ends with a
    /// newline, so such a row was never acknowledged, and leaving it could
    /// hold an open quote that swallows the rows appended after it.
    fn drop_partial_tail(&self, start: u64) -> Result<(), IndexError> {
        let mut file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let len = file.metadata()?.len();
        if len <= start || ends_with_newline(&mut file)? {
            return Ok(());
        }
        file.set_len(start)?;
        file.sync_all()?;
        warn!(
            index = %self.path.display(),
            bytes = len - start,
            "Dropped partial trailing row"
        );
        Ok(())
    }

    /// Move the current file to `<name>.corrupt-<timestamp>`.
    fn quarantine(&self) -> Result<PathBuf, IndexError> {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "index.csv".to_string());
        let aside = self.path.with_file_name(format!(
            "{}.corrupt-{}",
            file_name,
            Utc::now().format("%Y%m%d%H%M%S")
        ));
        fs::rename(&self.path, &aside)?;
        Ok(aside)
    }

    /// Rewrite the whole index in the current layout via a temp file.
    fn rewrite(&self, state: &IndexState) -> Result<(), IndexError> {
        let tmp = self.path.with_extension("csv.tmp");
        {
            let file = File::create(&tmp)?;
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(file);
            writer.write_record(INDEX_COLUMNS)?;
            for entry in state.ordered() {
                writer.serialize(IndexRow::from(entry))?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        info!(index = %self.path.display(), rows = state.entries.len(), "Rewrote index in current layout");
        Ok(())
    }

    fn open_writer(&self) -> Result<csv::Writer<File>, IndexError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;
        let len = file.metadata()?.len();

        // A crash mid-row leaves no trailing newline; start the next row on
        // its own line so only the broken row is lost.
        if len > 0 && !ends_with_newline(&mut file)? {
            file.write_all(b"\n")?;
        }

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if len == 0 {
            writer.write_record(INDEX_COLUMNS)?;
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }
        Ok(writer)
    }

    fn payload_present(&self, relative: Option<&PathBuf>) -> bool {
        relative
            .and_then(|p| fs::metadata(self.payload_dir.join(p)).ok())
            .is_some_and(|m| m.is_file() && m.len() > 0)
    }
}

fn append_row(writer: &mut csv::Writer<File>, row: &IndexRow) -> Result<(), IndexError> {
    writer.serialize(row)?;
    writer.flush()?;
    writer.get_ref().sync_data()?;
    Ok(())
}

fn ends_with_newline(file: &mut File) -> std::io::Result<bool> {
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

impl ProgressStore for CsvProgressIndex {
    fn name(&self) -> &str {
        "csv"
    }

    fn load(&self) -> Result<LoadReport, IndexError> {
        let mut state = self.lock()?;
        state.clear();
        state.writer = None;

        let mut report = LoadReport::default();
        let current = match self.read_rows(&mut state, &mut report) {
            Ok(current) => current,
            Err(e @ IndexError::Unrecoverable { .. }) if self.fresh => {
                warn!(error = %e, "Starting with a fresh index");
                let aside = self.quarantine()?;
                state.clear();
                report = LoadReport {
                    quarantined: Some(aside),
                    ..Default::default()
                };
                true
            }
            Err(e) => return Err(e),
        };

        if !current {
            self.rewrite(&state)?;
        }

        // Successes whose payload vanished are retried like failures.
        let mut demoted = 0u64;
        for entry in state.entries.values_mut() {
            if entry.outcome == Outcome::Succeeded && !self.payload_present(entry.payload_path.as_ref()) {
                warn!(
                    id = %entry.id,
                    payload = ?entry.payload_path,
                    "Payload missing for recorded success, will retry"
                );
                entry.outcome = Outcome::Failed;
                demoted += 1;
            }
        }
        state.succeeded -= demoted;
        report.missing_payloads = demoted as usize;

        for entry in state.entries.values() {
            match entry.outcome {
                Outcome::Succeeded => report.succeeded += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::Rejected => report.rejected += 1,
            }
        }

        state.writer = Some(self.open_writer()?);
        state.loaded = true;

        info!(
            index = %self.path.display(),
            rows = report.rows,
            skipped = report.skipped,
            succeeded = report.succeeded,
            failed = report.failed,
            rejected = report.rejected,
            "Loaded progress index"
        );
        Ok(report)
    }

    fn outcome(&self, id: &RecordId) -> Option<Outcome> {
        self.lock().ok()?.entries.get(id).map(|e| e.outcome)
    }

    fn record(&self, entry: &ProgressEntry) -> Result<(), IndexError> {
        let mut state = self.lock()?;
        if !state.loaded {
            return Err(IndexError::NotLoaded);
        }
        if state
            .entries
            .get(&entry.id)
            .is_some_and(|e| e.outcome == Outcome::Succeeded)
        {
            return Err(IndexError::AlreadySucceeded(entry.id.clone()));
        }

        if state.writer.is_none() {
            state.writer = Some(self.open_writer()?);
        }
        let writer = state.writer.as_mut().ok_or(IndexError::NotLoaded)?;
        if let Err(e) = append_row(writer, &IndexRow::from(entry)) {
            // Reopen on the next call so a half-written row stays isolated.
            state.writer = None;
            return Err(e);
        }

        debug!(id = %entry.id, outcome = %entry.outcome, "Recorded index entry");
        state.apply(entry.clone());
        Ok(())
    }

    fn succeeded_count(&self) -> u64 {
        self.lock().map(|s| s.succeeded).unwrap_or_default()
    }

    fn retry_candidates(&self) -> Vec<ProgressEntry> {
        let Ok(state) = self.lock() else {
            return Vec::new();
        };
        state
            .ordered()
            .filter(|e| e.outcome == Outcome::Failed && !e.pdf_url.is_empty())
            .cloned()
            .collect()
    }
}
