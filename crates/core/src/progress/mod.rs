//! Durable progress index.
//!
//! One entry per identity with its terminal outcome. Successes are what the
//! target counter is reconciled from at startup, so an entry is only counted
//! once it is on disk.

mod csv_store;
mod store;
mod types;
mod writer;

pub use csv_store::CsvProgressIndex;
pub use store::{IndexError, ProgressStore};
pub use types::{IndexRow, LoadReport, Outcome, ProgressEntry, INDEX_COLUMNS};
pub use writer::{create_index_system, IndexCommand, IndexHandle, IndexWriter};
