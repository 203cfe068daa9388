//! Message types for the runner pool actor.

/// Messages for the RunnerPool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerMessage {
    /// Try to claim and dispatch one job.
    CheckCapacity,

    /// Stop claiming new jobs. In-flight tasks keep running.
    Shutdown,
}
