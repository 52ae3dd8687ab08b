//! Fetch worker pool and transport.
//!
//! The pool downloads accepted records under a fixed concurrency bound,
//! retrying transient failures with backoff and writing each payload
//! atomically under its deterministic file name.

mod http;
mod pool;
mod storage;
mod traits;
mod types;

pub use http::HttpTransport;
pub use pool::{DrainResult, FetchPool};
pub use storage::{ensure_payload_dir, payload_exists, sweep_partials, write_payload};
pub use traits::FetchTransport;
pub use types::{FetchError, FetchOutcome, Payload, PoolError, PoolStatus, TaskReport};
