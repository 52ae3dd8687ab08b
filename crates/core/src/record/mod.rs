//! Records discovered from the feed, their identities, and payload naming.

mod naming;
mod types;

pub use naming::{identity_digest, slugify, NamingStrategy, PAYLOAD_SUBDIR};
pub use types::{join_unique, normalize_spaces, DownloadTask, Record, RecordId};
