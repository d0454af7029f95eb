//! runwatch CI Domain Model
//!
//! Typed view of a CI provider's run and job status:
//! - RunStatus / Conclusion: the provider vocabularies as enums
//! - RunPhase: the run state machine (Queued -> InProgress -> Completed)
//! - StatusSnapshot: one parsed provider response, with its raw payload
//! - RunState: the per-run accumulator that decides when a run is finished
//! - Outcome: the terminal result of a wait and its exit code
//!
//! This crate performs no I/O. Parsing failures surface as [`SnapshotError`].

pub mod error;
pub mod outcome;
pub mod progress;
pub mod run_state;
pub mod snapshot;
pub mod status;

pub use error::{Result, SnapshotError};
pub use outcome::Outcome;
pub use progress::ProgressStats;
pub use run_state::{JobTransition, Observation, RunState};
pub use snapshot::{JobStatus, JobStep, ProviderPayload, RunId, StatusSnapshot};
pub use status::{Conclusion, RunPhase, RunStatus};
