//! Job repository: load-all, upsert and delete against the `job` table.

use chrono::{DateTime, Utc};
use mediaq_core::{Job, JobId, JobState};
use serde::{Deserialize, Serialize};
use surrealdb::sql::Thing;

use crate::{Database, DbError};

const TABLE: &str = "job";

const LOAD_ALL: &str = "SELECT * FROM job ORDER BY job_order_position ASC";

/// A job as read back from storage, with its claim-order position.
#[derive(Debug, Clone)]
pub struct StoredJob {
    pub job: Job,
    pub position: i64,
}

/// Row layout of the `job` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct JobRecord {
    #[serde(skip_serializing)]
    id: Option<Thing>,
    job_id: String,
    command: String,
    arguments: String,
    input: String,
    host: String,
    stdout: String,
    dependencies: String,
    state: i64,
    created_at: String,
    claimed_at: Option<String>,
    completed_at: Option<String>,
    errored_at: Option<String>,
    job_order_position: i64,
}

impl JobRecord {
    fn from_job(job: &Job, position: i64) -> Result<Self, DbError> {
        let dependencies: Vec<String> = job.dependencies.iter().map(|d| d.to_string()).collect();

        Ok(Self {
            id: None,
            job_id: job.id.to_string(),
            command: job.command.clone(),
            arguments: serde_json::to_string(&job.arguments)?,
            input: job.input.clone(),
            host: job.host.clone(),
            stdout: serde_json::to_string(&job.stdout)?,
            dependencies: serde_json::to_string(&dependencies)?,
            state: job.state.as_i64(),
            created_at: job.created_at.to_rfc3339(),
            claimed_at: job.claimed_at.map(|t| t.to_rfc3339()),
            completed_at: job.completed_at.map(|t| t.to_rfc3339()),
            errored_at: job.errored_at.map(|t| t.to_rfc3339()),
            job_order_position: position,
        })
    }

    fn into_stored(self) -> Result<StoredJob, DbError> {
        let invalid = |reason: String| DbError::InvalidRecord {
            id: self.job_id.clone(),
            reason,
        };

        let id = JobId::parse(&self.job_id).map_err(|e| invalid(e.to_string()))?;
        let state = JobState::try_from(self.state)
            .map_err(|raw| invalid(format!("unknown state {}", raw)))?;
        let arguments: Vec<String> = serde_json::from_str(&self.arguments)?;
        let stdout: Vec<String> = serde_json::from_str(&self.stdout)?;
        let raw_dependencies: Vec<String> = serde_json::from_str(&self.dependencies)?;
        let dependencies = raw_dependencies
            .iter()
            .map(|d| JobId::parse(d))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| invalid(format!("bad dependency: {}", e)))?;

        let created_at = parse_time(&self.created_at).map_err(&invalid)?;
        let claimed_at = parse_optional_time(self.claimed_at.as_deref()).map_err(&invalid)?;
        let completed_at = parse_optional_time(self.completed_at.as_deref()).map_err(&invalid)?;
        let errored_at = parse_optional_time(self.errored_at.as_deref()).map_err(&invalid)?;

        // `Job::new` gives the restored job a fresh cancellation token.
        let mut job = Job::new(self.command.clone(), arguments, self.input.clone(), dependencies);
        job.id = id;
        job.host = self.host.clone();
        job.state = state;
        job.stdout = stdout;
        job.created_at = created_at;
        job.claimed_at = claimed_at;
        job.completed_at = completed_at;
        job.errored_at = errored_at;

        Ok(StoredJob {
            job,
            position: self.job_order_position,
        })
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp {:?}: {}", raw, e))
}

fn parse_optional_time(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, String> {
    raw.map(parse_time).transpose()
}

/// Repository for job persistence operations.
#[derive(Debug, Clone)]
pub struct JobRepository {
    db: Database,
}

impl JobRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create the `job` table if it does not exist yet.
    pub async fn ensure_table(&self) -> Result<(), DbError> {
        crate::init_schema(&self.db).await
    }

    /// Load every job, ordered by claim-order position.
    ///
    /// Rows that cannot be decoded are logged and skipped.
    pub async fn load_all(&self) -> Result<Vec<StoredJob>, DbError> {
        let mut response = self.db.query(LOAD_ALL).await?;
        let records: Vec<JobRecord> = response.take(0)?;

        let mut jobs = Vec::with_capacity(records.len());
        for record in records {
            let job_id = record.job_id.clone();
            match record.into_stored() {
                Ok(stored) => jobs.push(stored),
                Err(e) => tracing::warn!("Skipping unreadable job row {}: {}", job_id, e),
            }
        }

        tracing::debug!("Loaded {} jobs from storage", jobs.len());
        Ok(jobs)
    }

    /// Insert or replace the row for `job`.
    pub async fn upsert(&self, job: &Job, position: i64) -> Result<(), DbError> {
        let record = JobRecord::from_job(job, position)?;

        let _: Option<JobRecord> = self
            .db
            .upsert((TABLE, job.id.to_string()))
            .content(record)
            .await?;

        Ok(())
    }

    /// Delete the row for `id`. Deleting a missing row is not an error.
    pub async fn delete(&self, id: JobId) -> Result<(), DbError> {
        let _: Option<JobRecord> = self.db.delete((TABLE, id.to_string())).await?;

        Ok(())
    }
}
