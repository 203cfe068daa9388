//! Event types pushed to observers of the job queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Job, JobId};

/// Renders the HTML fragment attached to job-list events.
///
/// Supplied by the UI layer; the queue only calls it.
pub trait JobRenderer: Send + Sync + 'static {
    fn render(&self, job: &Job) -> String;
}

/// Events emitted by the job queue for real-time updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A job was added to the queue.
    Created {
        job: Job,
        #[serde(skip_serializing_if = "Option::is_none")]
        html: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// A job changed state.
    Updated {
        job: Job,
        #[serde(skip_serializing_if = "Option::is_none")]
        html: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// A job was removed from the queue.
    Deleted {
        job: Job,
        #[serde(skip_serializing_if = "Option::is_none")]
        html: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// A running task produced a line of output.
    Stdout {
        job_id: JobId,
        line: String,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::Created { timestamp, .. } => *timestamp,
            JobEvent::Updated { timestamp, .. } => *timestamp,
            JobEvent::Deleted { timestamp, .. } => *timestamp,
            JobEvent::Stdout { timestamp, .. } => *timestamp,
        }
    }

    /// Get the job ID this event is about.
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Created { job, .. } => job.id,
            JobEvent::Updated { job, .. } => job.id,
            JobEvent::Deleted { job, .. } => job.id,
            JobEvent::Stdout { job_id, .. } => *job_id,
        }
    }

    /// The wire name of the event, as consumed by the UI.
    pub fn kind(&self) -> &'static str {
        match self {
            JobEvent::Created { .. } => "create",
            JobEvent::Updated { .. } => "update",
            JobEvent::Deleted { .. } => "delete",
            JobEvent::Stdout { .. } => "stdout",
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::Created { job, .. } => {
                format!("Job {} ({}) created on {}", job.id, job.command, job.host)
            }
            JobEvent::Updated { job, .. } => format!("Job {} -> {}", job.id, job.state),
            JobEvent::Deleted { job, .. } => format!("Job {} deleted", job.id),
            JobEvent::Stdout { job_id, line, .. } => format!("Job {}: {}", job_id, line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JobState;

    #[test]
    fn events_are_tagged_for_the_ui() {
        let job = Job::new("ingest", vec![], "https://www.youtube.com/watch?v=x", vec![]);
        let event = JobEvent::Created {
            job: job.clone(),
            html: None,
            timestamp: Utc::now(),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "created");
        assert_eq!(value["job"]["host"], "youtube.com");
        assert_eq!(value["job"]["state"], "pending");
        assert!(value.get("html").is_none());
        assert_eq!(event.kind(), "create");
        assert_eq!(event.job_id(), job.id);
    }

    #[test]
    fn deserialized_job_gets_a_live_token() {
        let mut job = Job::new("metadata", vec![], "/a.mp4", vec![]);
        job.cancel().unwrap();

        let json = serde_json::to_string(&job).unwrap();
        let restored: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.state, JobState::Cancelled);
        assert!(!restored.is_cancelled());
    }
}
