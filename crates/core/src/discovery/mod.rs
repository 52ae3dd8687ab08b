//! Discovery feed contract and adapters.

mod doaj;
mod job_state;
mod ledger;
mod traits;
mod types;

pub use doaj::{parse_search_page, DoajFeed};
pub use job_state::{JobState, JobStateError, JobStateStore};
pub use ledger::{CursorLedger, PageId};
pub use traits::DiscoveryFeed;
pub use types::{FeedCursor, FeedError, FeedPage};
