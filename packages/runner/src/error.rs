//! Error types for the queue and the runner pool.

use mediaq_core::{JobId, TransitionError};

/// Structural errors returned by queue operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
}

/// Why a dispatched job did not run to completion.
///
/// Never propagated: the pool turns these into a terminal job state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("No task registered for command: {0}")]
    UnknownTask(String),

    #[error("Task failed: {0}")]
    Handler(String),
}

/// Errors starting or talking to the runner pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("The queue's wake-up receiver is already owned by another pool")]
    WakeReceiverTaken,

    #[error("Failed to spawn runner pool: {0}")]
    Spawn(#[from] ractor::SpawnErr),

    #[error("Runner pool is not running: {0}")]
    Messaging(String),
}
