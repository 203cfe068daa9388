//! Job domain types and the job state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use ulid::Ulid;

use crate::host::derive_host;

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a job.
///
/// Transitions are one-way: `Pending -> InProgress -> {Completed, Error, Cancelled}`
/// and `Pending -> Cancelled`. The three terminal states have no way out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting to be claimed.
    #[default]
    Pending,
    /// Claimed by the runner pool and executing.
    InProgress,
    /// Finished successfully.
    Completed,
    /// Cancelled while queued or running.
    Cancelled,
    /// Finished with an error.
    Error,
}

impl JobState {
    /// Stable integer encoding used by the durable store.
    pub fn as_i64(self) -> i64 {
        match self {
            JobState::Pending => 0,
            JobState::InProgress => 1,
            JobState::Completed => 2,
            JobState::Cancelled => 3,
            JobState::Error => 4,
        }
    }

    /// Check if the job can never change state again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Cancelled | JobState::Error
        )
    }

    /// Get a simple state string for display.
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::InProgress => "in_progress",
            JobState::Completed => "completed",
            JobState::Cancelled => "cancelled",
            JobState::Error => "error",
        }
    }
}

impl TryFrom<i64> for JobState {
    type Error = i64;

    fn try_from(value: i64) -> Result<Self, i64> {
        match value {
            0 => Ok(JobState::Pending),
            1 => Ok(JobState::InProgress),
            2 => Ok(JobState::Completed),
            3 => Ok(JobState::Cancelled),
            4 => Ok(JobState::Error),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change was requested from the wrong source state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot {action} job {job_id} while it is {from}")]
pub struct TransitionError {
    pub job_id: JobId,
    pub from: JobState,
    pub action: &'static str,
}

/// A job is a unit of externally executed work.
///
/// The cancellation token is never serialized; a fresh one is created whenever a
/// job is constructed or loaded back from storage. Clones share the same token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Selects the task handler.
    pub command: String,
    /// Handler-specific arguments.
    #[serde(default)]
    pub arguments: Vec<String>,
    /// Handler-specific payload, e.g. a URL or a list of paths.
    #[serde(default)]
    pub input: String,
    /// Concurrency throttling key, fixed at creation.
    pub host: String,
    /// Jobs that must be completed before this one may be claimed.
    #[serde(default)]
    pub dependencies: Vec<JobId>,
    pub state: JobState,
    /// Lines produced by the running task.
    #[serde(default)]
    pub stdout: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub errored_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    cancel_token: CancellationToken,
}

impl Job {
    /// Create a new pending job. The host key is derived from `command` and `input`.
    pub fn new(
        command: impl Into<String>,
        arguments: Vec<String>,
        input: impl Into<String>,
        dependencies: Vec<JobId>,
    ) -> Self {
        let command = command.into();
        let input = input.into();
        let host = derive_host(&command, &input);
        let mut deduped: Vec<JobId> = Vec::with_capacity(dependencies.len());
        for dep in dependencies {
            if !deduped.contains(&dep) {
                deduped.push(dep);
            }
        }

        Self {
            id: JobId::new(),
            command,
            arguments,
            input,
            host,
            dependencies: deduped,
            state: JobState::Pending,
            stdout: Vec::new(),
            created_at: Utc::now(),
            claimed_at: None,
            completed_at: None,
            errored_at: None,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Copy the static fields into a fresh pending job with a new ID.
    pub fn duplicate(&self) -> Self {
        Self {
            id: JobId::new(),
            command: self.command.clone(),
            arguments: self.arguments.clone(),
            input: self.input.clone(),
            host: self.host.clone(),
            dependencies: self.dependencies.clone(),
            state: JobState::Pending,
            stdout: Vec::new(),
            created_at: Utc::now(),
            claimed_at: None,
            completed_at: None,
            errored_at: None,
            cancel_token: CancellationToken::new(),
        }
    }

    /// The job's cooperative cancellation signal.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Whether cancellation has been requested for this job.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// `Pending -> InProgress`.
    pub fn claim(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.require(JobState::Pending, "claim")?;
        self.state = JobState::InProgress;
        self.claimed_at = Some(now);
        Ok(())
    }

    /// `InProgress -> Completed`.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.require(JobState::InProgress, "complete")?;
        self.state = JobState::Completed;
        self.completed_at = Some(now);
        Ok(())
    }

    /// `InProgress -> Error`.
    pub fn fail(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.require(JobState::InProgress, "fail")?;
        self.state = JobState::Error;
        self.errored_at = Some(now);
        Ok(())
    }

    /// `Pending | InProgress -> Cancelled`, firing the cancellation token.
    ///
    /// Returns the state the job was in before cancelling.
    pub fn cancel(&mut self) -> Result<JobState, TransitionError> {
        let from = self.state;
        if !matches!(from, JobState::Pending | JobState::InProgress) {
            return Err(TransitionError {
                job_id: self.id,
                from,
                action: "cancel",
            });
        }
        self.state = JobState::Cancelled;
        self.cancel_token.cancel();
        Ok(from)
    }

    /// Put an interrupted job back in line after a restart.
    ///
    /// Only jobs found `InProgress` are affected; returns whether anything changed.
    pub fn requeue_interrupted(&mut self) -> bool {
        if self.state != JobState::InProgress {
            return false;
        }
        self.state = JobState::Pending;
        self.claimed_at = None;
        true
    }

    fn require(&self, expected: JobState, action: &'static str) -> Result<(), TransitionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(TransitionError {
                job_id: self.id,
                from: self.state,
                action,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new("metadata", vec![], "/local/file", vec![])
    }

    #[test]
    fn happy_path_stamps_each_timestamp_once() {
        let mut job = job();
        let now = Utc::now();
        job.claim(now).unwrap();
        assert_eq!(job.state, JobState::InProgress);
        assert_eq!(job.claimed_at, Some(now));

        job.complete(now).unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.completed_at, Some(now));
        assert!(job.errored_at.is_none());
    }

    #[test]
    fn completing_a_pending_job_is_rejected() {
        let mut job = job();
        let err = job.complete(Utc::now()).unwrap_err();
        assert_eq!(err.from, JobState::Pending);
        assert_eq!(err.action, "complete");
        assert_eq!(job.state, JobState::Pending);
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn terminal_states_reject_everything() {
        let mut job = job();
        job.claim(Utc::now()).unwrap();
        job.fail(Utc::now()).unwrap();

        assert!(job.claim(Utc::now()).is_err());
        assert!(job.complete(Utc::now()).is_err());
        assert!(job.cancel().is_err());
        assert_eq!(job.state, JobState::Error);
    }

    #[test]
    fn cancel_fires_token_shared_by_clones() {
        let mut job = job();
        let observer = job.clone();
        assert_eq!(job.cancel().unwrap(), JobState::Pending);
        assert!(observer.is_cancelled());
    }

    #[test]
    fn duplicate_resets_lifecycle() {
        let mut original = Job::new("ingest", vec!["-x".into()], "https://a.org/v", vec![]);
        original.claim(Utc::now()).unwrap();
        original.stdout.push("line".into());
        original.cancel().unwrap();

        let copy = original.duplicate();
        assert_ne!(copy.id, original.id);
        assert_eq!(copy.command, "ingest");
        assert_eq!(copy.arguments, original.arguments);
        assert_eq!(copy.host, "a.org");
        assert_eq!(copy.state, JobState::Pending);
        assert!(copy.stdout.is_empty());
        assert!(copy.claimed_at.is_none());
        assert!(!copy.is_cancelled());
    }

    #[test]
    fn requeue_only_touches_in_progress() {
        let mut job = job();
        assert!(!job.requeue_interrupted());
        job.claim(Utc::now()).unwrap();
        assert!(job.requeue_interrupted());
        assert_eq!(job.state, JobState::Pending);
        assert!(job.claimed_at.is_none());
    }

    #[test]
    fn state_integer_encoding_is_stable() {
        for state in [
            JobState::Pending,
            JobState::InProgress,
            JobState::Completed,
            JobState::Cancelled,
            JobState::Error,
        ] {
            assert_eq!(JobState::try_from(state.as_i64()), Ok(state));
        }
        assert_eq!(JobState::try_from(9), Err(9));
    }

    #[test]
    fn duplicate_dependencies_are_collapsed() {
        let dep = JobId::new();
        let job = Job::new("metadata", vec![], "", vec![dep, dep]);
        assert_eq!(job.dependencies, vec![dep]);
    }
}
