//! Batch jobs: dispatch, state machine and monitoring.
//!
//! ```text
//! CandidateBatch ──submit──> BatchDispatcher ──spawn──> job task
//!                                 │                        │
//!                                 └──> JobHandle <──watch──┘
//! ```
//!
//! The job task owns the only writer of the job's [`JobSummary`]; every
//! [`JobHandle`] observes it through a watch channel.

mod dispatcher;
mod handle;
mod state;
mod summary;

pub use dispatcher::BatchDispatcher;
pub use handle::JobHandle;
pub use state::JobState;
pub use summary::{JobSummary, RecordFailure};
