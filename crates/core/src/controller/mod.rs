//! Acquisition controller.
//!
//! One run moves through these states:
//!
//! ```text
//! startup --(counter >= target)--> already_complete
//!    |
//!    v
//! acquiring --(counter == target)--> target_reached
//!    |      --(feed dry, nothing in flight)--> source_exhausted
//!    |      --(cancelled)--> interrupted
//!    v
//! draining (in-flight work gets a grace period, the rest is recorded failed)
//! ```
//!
//! Admission keeps `counter + in_flight <= target`, so a run never starts
//! more downloads than it still needs.

mod counter;
mod runner;
mod types;

pub use counter::TargetCounter;
pub use runner::AcquisitionController;
pub use types::{ControllerError, RunStatus, RunSummary};
