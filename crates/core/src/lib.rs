pub mod classifier;
pub mod config;
pub mod controller;
pub mod discovery;
pub mod fetch;
pub mod progress;
pub mod record;
pub mod testing;

pub use classifier::{Classifier, LanguageDetector, RejectReason, Verdict, WhatlangDetector};
pub use config::{
    load_config, load_config_from_str, load_config_or_default, validate_config, Config,
    ConfigError,
};
pub use controller::{AcquisitionController, ControllerError, RunStatus, RunSummary};
pub use discovery::{DiscoveryFeed, DoajFeed, FeedCursor, FeedError};
pub use fetch::{FetchError, FetchPool, FetchTransport, HttpTransport};
pub use progress::{CsvProgressIndex, IndexError, Outcome, ProgressEntry, ProgressStore};
pub use record::{DownloadTask, NamingStrategy, Record, RecordId};
