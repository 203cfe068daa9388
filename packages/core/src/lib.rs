//! Core domain types for the media job queue.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobId and JobState for units of work and their state machine
//! - Host key derivation used for per-host throttling
//! - Workflow trees for dependent jobs
//! - Queue statistics
//! - Events for real-time updates

mod events;
mod host;
mod job;
mod stats;
mod workflow;

pub use events::{JobEvent, JobRenderer};
pub use host::{INGEST_COMMAND, LOCAL_HOST, derive_host};
pub use job::{Job, JobId, JobState, TransitionError};
pub use stats::QueueStats;
pub use workflow::Workflow;
