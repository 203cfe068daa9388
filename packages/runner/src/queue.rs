//! The job queue: admission rules, state mutation, persistence and events.
//!
//! Every public operation holds the queue's single mutex for its whole duration,
//! including the best-effort write to the store, so operations are linearizable
//! with respect to each other.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use db::repositories::{JobRepository, StoredJob};
use mediaq_core::{Job, JobEvent, JobId, JobRenderer, JobState, QueueStats, Workflow};
use tokio::sync::{Mutex, broadcast, mpsc};

use crate::config::{DEFAULT_HOST_LIMIT, QueueConfig};
use crate::error::QueueError;

/// In-memory queue state guarded by the queue mutex.
#[derive(Debug, Default)]
struct QueueState {
    jobs: HashMap<JobId, Job>,
    /// FIFO scan order for claiming.
    job_order: Vec<JobId>,
    /// Storage position of each job; only grows, so reloads keep relative order.
    positions: HashMap<JobId, i64>,
    next_position: i64,
    host_limits: HashMap<String, usize>,
    running_counts: HashMap<String, usize>,
}

impl QueueState {
    fn insert(&mut self, job: Job) -> i64 {
        let position = self.next_position;
        self.next_position = self.next_position.saturating_add(1);
        self.job_order.push(job.id);
        self.positions.insert(job.id, position);
        self.jobs.insert(job.id, job);
        position
    }

    fn restore(&mut self, stored: StoredJob) {
        let StoredJob { job, position } = stored;
        if self.jobs.contains_key(&job.id) {
            tracing::warn!("Ignoring duplicate stored job {}", job.id);
            return;
        }
        self.next_position = self.next_position.max(position.saturating_add(1));
        self.job_order.push(job.id);
        self.positions.insert(job.id, position);
        self.jobs.insert(job.id, job);
    }

    fn position(&self, id: JobId) -> i64 {
        self.positions.get(&id).copied().unwrap_or_default()
    }

    fn host_limit(&self, host: &str) -> usize {
        self.host_limits
            .get(host)
            .copied()
            .unwrap_or(DEFAULT_HOST_LIMIT)
    }

    fn running(&self, host: &str) -> usize {
        self.running_counts.get(host).copied().unwrap_or(0)
    }

    fn has_capacity(&self, host: &str) -> bool {
        self.running(host) < self.host_limit(host)
    }

    /// Every dependency exists and is completed. A missing one blocks forever.
    fn dependencies_met(&self, job: &Job) -> bool {
        job.dependencies.iter().all(|dep| {
            self.jobs
                .get(dep)
                .is_some_and(|d| d.state == JobState::Completed)
        })
    }

    fn next_claimable(&self) -> Option<JobId> {
        self.job_order.iter().copied().find(|id| {
            self.jobs.get(id).is_some_and(|job| {
                job.state == JobState::Pending
                    && self.dependencies_met(job)
                    && self.has_capacity(&job.host)
            })
        })
    }

    fn acquire_slot(&mut self, host: &str) {
        *self.running_counts.entry(host.to_string()).or_insert(0) += 1;
    }

    fn release_slot(&mut self, host: &str) {
        if let Some(count) = self.running_counts.get_mut(host) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.running_counts.remove(host);
            }
        }
    }

    /// Drop a job from every index, releasing its slot if it was running.
    fn remove(&mut self, id: JobId) -> Option<Job> {
        let job = self.jobs.remove(&id)?;
        if job.state == JobState::InProgress {
            self.release_slot(&job.host);
        }
        self.job_order.retain(|other| *other != id);
        self.positions.remove(&id);
        Some(job)
    }
}

struct QueueInner {
    state: Mutex<QueueState>,
    wake_tx: mpsc::Sender<JobId>,
    wake_rx: Mutex<Option<mpsc::Receiver<JobId>>>,
    events: broadcast::Sender<JobEvent>,
    store: Option<JobRepository>,
    renderer: Option<Arc<dyn JobRenderer>>,
}

/// Shared handle to the job queue. Clones refer to the same queue.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("persistent", &self.inner.store.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for a [`JobQueue`].
pub struct QueueBuilder {
    config: QueueConfig,
    store: Option<JobRepository>,
    renderer: Option<Arc<dyn JobRenderer>>,
}

impl QueueBuilder {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            store: None,
            renderer: None,
        }
    }

    /// Persist jobs to `store` and recover them from it on build.
    pub fn with_store(mut self, store: JobRepository) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach the renderer used for event HTML fragments.
    pub fn with_renderer(mut self, renderer: Arc<dyn JobRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Build the queue, loading and recovering persisted jobs if a store is set.
    ///
    /// Store failures are logged; the queue then starts with whatever it could load.
    pub async fn build(self) -> JobQueue {
        let mut state = QueueState {
            host_limits: self.config.host_limits.clone(),
            ..Default::default()
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.ensure_table().await {
                tracing::warn!("Failed to create job table: {}", e);
            }
            match store.load_all().await {
                Ok(stored) => {
                    tracing::info!("Loaded {} jobs from storage", stored.len());
                    for job in stored {
                        state.restore(job);
                    }
                }
                Err(e) => tracing::warn!("Failed to load jobs, starting empty: {}", e),
            }
        }

        let (wake_tx, wake_rx) = mpsc::channel(self.config.wake_capacity.max(1));
        let (events, _) = broadcast::channel(self.config.event_capacity.max(1));

        let queue = JobQueue {
            inner: Arc::new(QueueInner {
                state: Mutex::new(state),
                wake_tx,
                wake_rx: Mutex::new(Some(wake_rx)),
                events,
                store: self.store,
                renderer: self.renderer,
            }),
        };

        queue.recover_interrupted().await;
        queue
    }
}

impl JobQueue {
    /// Create a queue without persistence.
    pub async fn in_memory(config: QueueConfig) -> Self {
        QueueBuilder::new(config).build().await
    }

    /// Start building a queue.
    pub fn builder(config: QueueConfig) -> QueueBuilder {
        QueueBuilder::new(config)
    }

    /// Hand out the wake-up receiver. Only the first caller gets it.
    pub async fn take_wake_receiver(&self) -> Option<mpsc::Receiver<JobId>> {
        self.inner.wake_rx.lock().await.take()
    }

    /// Subscribe to job events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Add a new pending job and return its ID.
    ///
    /// Never fails: persistence problems are logged and the job lives on in memory.
    pub async fn add_job(
        &self,
        command: impl Into<String>,
        arguments: Vec<String>,
        input: impl Into<String>,
        dependencies: Vec<JobId>,
    ) -> JobId {
        let job = Job::new(command, arguments, input, dependencies);
        let mut state = self.inner.state.lock().await;
        self.enqueue_locked(&mut state, job).await
    }

    /// Add a workflow tree. Children are added before their parent and become
    /// its dependencies. Returns the ID of the root job.
    pub async fn add_workflow(&self, workflow: &Workflow) -> JobId {
        let mut planned = Vec::with_capacity(workflow.node_count());
        let root = plan_workflow(workflow, &mut planned);

        let mut state = self.inner.state.lock().await;
        for job in planned {
            self.enqueue_locked(&mut state, job).await;
        }
        root
    }

    /// Duplicate an existing job as a fresh pending job.
    pub async fn copy_job(&self, id: JobId) -> Result<JobId, QueueError> {
        let mut state = self.inner.state.lock().await;
        let copy = state
            .jobs
            .get(&id)
            .map(Job::duplicate)
            .ok_or(QueueError::NotFound(id))?;
        Ok(self.enqueue_locked(&mut state, copy).await)
    }

    /// Claim the first eligible job in FIFO order.
    ///
    /// A job is eligible when it is pending, all of its dependencies are
    /// completed and its host has a free slot. `None` means nothing is eligible
    /// right now.
    pub async fn claim_job(&self) -> Option<Job> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let id = state.next_claimable()?;
        let job = state.jobs.get_mut(&id)?;
        if let Err(e) = job.claim(Utc::now()) {
            tracing::error!("Claimable job refused claim: {}", e);
            return None;
        }
        let snapshot = job.clone();
        state.acquire_slot(&snapshot.host);
        let position = state.position(id);

        tracing::debug!(
            "Claimed job {} ({}) on {} [{}/{}]",
            id,
            snapshot.command,
            snapshot.host,
            state.running(&snapshot.host),
            state.host_limit(&snapshot.host)
        );

        self.persist(&snapshot, position).await;
        self.emit_updated(&snapshot);
        Some(snapshot)
    }

    /// Mark a running job as completed.
    pub async fn complete_job(&self, id: JobId) -> Result<(), QueueError> {
        self.finish(id, JobState::Completed).await
    }

    /// Mark a running job as failed.
    pub async fn error_job(&self, id: JobId) -> Result<(), QueueError> {
        self.finish(id, JobState::Error).await
    }

    /// Cancel a pending or running job and fire its cancellation token.
    pub async fn cancel_job(&self, id: JobId) -> Result<(), QueueError> {
        self.finish(id, JobState::Cancelled).await
    }

    async fn finish(&self, id: JobId, target: JobState) -> Result<(), QueueError> {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let job = state.jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        let now = Utc::now();
        let was_running = match target {
            JobState::Completed => job.complete(now).map(|_| true)?,
            JobState::Error => job.fail(now).map(|_| true)?,
            _ => job.cancel()? == JobState::InProgress,
        };
        let snapshot = job.clone();
        if was_running {
            state.release_slot(&snapshot.host);
        }
        let position = state.position(id);

        tracing::debug!("Job {} ({}) -> {}", id, snapshot.command, snapshot.state);

        self.persist(&snapshot, position).await;
        self.emit_updated(&snapshot);
        Ok(())
    }

    /// Append a line to a job's stdout and broadcast it.
    pub async fn push_job_stdout(
        &self,
        id: JobId,
        line: impl Into<String>,
    ) -> Result<(), QueueError> {
        let line = line.into();
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let job = state.jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        job.stdout.push(line.clone());
        let snapshot = job.clone();
        let position = state.position(id);

        self.persist(&snapshot, position).await;
        let _ = self.inner.events.send(JobEvent::Stdout {
            job_id: id,
            line,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Forcefully delete a job in any state.
    ///
    /// A running job gives its host slot back immediately and has its
    /// cancellation token fired so the orphaned task can stop.
    pub async fn remove_job(&self, id: JobId) -> Result<(), QueueError> {
        let mut state = self.inner.state.lock().await;
        let job = state.remove(id).ok_or(QueueError::NotFound(id))?;
        if job.state == JobState::InProgress {
            tracing::info!("Removed running job {} on {}", id, job.host);
            job.cancel_token().cancel();
        }

        self.forget(id).await;
        self.emit_deleted(&job);
        Ok(())
    }

    /// Delete every job that is not in progress. Returns how many were removed.
    pub async fn clear_non_running_jobs(&self) -> usize {
        let mut state = self.inner.state.lock().await;
        let doomed: Vec<JobId> = state
            .job_order
            .iter()
            .copied()
            .filter(|id| {
                state
                    .jobs
                    .get(id)
                    .is_some_and(|job| job.state != JobState::InProgress)
            })
            .collect();

        for id in &doomed {
            if let Some(job) = state.remove(*id) {
                self.forget(*id).await;
                self.emit_deleted(&job);
            }
        }

        tracing::info!("Cleared {} non-running jobs", doomed.len());
        doomed.len()
    }

    /// Set the maximum number of concurrently running jobs for `host`.
    pub async fn set_host_limit(&self, host: impl Into<String>, limit: usize) {
        let host = host.into();
        tracing::info!("Host limit for {} set to {}", host, limit);
        self.inner.state.lock().await.host_limits.insert(host, limit);
    }

    /// Effective concurrency limit for `host`.
    pub async fn host_limit(&self, host: &str) -> usize {
        self.inner.state.lock().await.host_limit(host)
    }

    /// Number of jobs currently in progress on `host`.
    pub async fn running_count(&self, host: &str) -> usize {
        self.inner.state.lock().await.running(host)
    }

    /// Snapshot of one job.
    pub async fn get_job(&self, id: JobId) -> Option<Job> {
        self.inner.state.lock().await.jobs.get(&id).cloned()
    }

    /// Snapshot of every job, in claim order.
    pub async fn list_jobs(&self) -> Vec<Job> {
        let state = self.inner.state.lock().await;
        state
            .job_order
            .iter()
            .filter_map(|id| state.jobs.get(id).cloned())
            .collect()
    }

    /// Job counts by state.
    pub async fn stats(&self) -> QueueStats {
        let state = self.inner.state.lock().await;
        state.jobs.values().map(|job| job.state).collect()
    }

    /// Write every job to the store. Returns how many writes succeeded.
    ///
    /// Meant for clean shutdown; a no-op without a store.
    pub async fn persist_all(&self) -> usize {
        let Some(store) = &self.inner.store else {
            return 0;
        };

        let state = self.inner.state.lock().await;
        let mut written = 0;
        for id in &state.job_order {
            let Some(job) = state.jobs.get(id) else {
                continue;
            };
            match store.upsert(job, state.position(*id)).await {
                Ok(()) => written += 1,
                Err(e) => tracing::warn!("Failed to persist job {}: {}", id, e),
            }
        }

        tracing::info!("Persisted {} of {} jobs", written, state.job_order.len());
        written
    }

    /// Requeue jobs that were running when the previous process died.
    async fn recover_interrupted(&self) {
        let mut guard = self.inner.state.lock().await;
        let state = &mut *guard;

        let mut recovered = Vec::new();
        for id in &state.job_order {
            if let Some(job) = state.jobs.get_mut(id)
                && job.requeue_interrupted()
            {
                recovered.push((job.clone(), state.positions.get(id).copied().unwrap_or_default()));
            }
        }

        if recovered.is_empty() {
            return;
        }

        tracing::info!("Requeued {} interrupted jobs", recovered.len());
        for (job, position) in &recovered {
            self.persist(job, *position).await;
            self.signal(job.id);
        }
    }

    async fn enqueue_locked(&self, state: &mut QueueState, job: Job) -> JobId {
        let id = job.id;
        tracing::debug!("Adding job {} ({}) on {}", id, job.command, job.host);

        let snapshot = job.clone();
        let position = state.insert(job);

        self.persist(&snapshot, position).await;
        self.signal(id);
        self.emit_created(&snapshot);
        id
    }

    /// Non-blocking wake-up. A full channel drops the signal; the runner pool
    /// re-checks capacity after every finished job regardless.
    fn signal(&self, id: JobId) {
        match self.inner.wake_tx.try_send(id) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!("Wake-up channel full, dropped signal for {}", id);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::trace!("No runner listening for wake-ups");
            }
        }
    }

    async fn persist(&self, job: &Job, position: i64) {
        if let Some(store) = &self.inner.store
            && let Err(e) = store.upsert(job, position).await
        {
            tracing::warn!("Failed to persist job {}: {}", job.id, e);
        }
    }

    async fn forget(&self, id: JobId) {
        if let Some(store) = &self.inner.store
            && let Err(e) = store.delete(id).await
        {
            tracing::warn!("Failed to delete job {} from storage: {}", id, e);
        }
    }

    fn render(&self, job: &Job) -> Option<String> {
        self.inner.renderer.as_ref().map(|r| r.render(job))
    }

    fn emit_created(&self, job: &Job) {
        let _ = self.inner.events.send(JobEvent::Created {
            job: job.clone(),
            html: self.render(job),
            timestamp: Utc::now(),
        });
    }

    fn emit_updated(&self, job: &Job) {
        let _ = self.inner.events.send(JobEvent::Updated {
            job: job.clone(),
            html: self.render(job),
            timestamp: Utc::now(),
        });
    }

    fn emit_deleted(&self, job: &Job) {
        let _ = self.inner.events.send(JobEvent::Deleted {
            job: job.clone(),
            html: self.render(job),
            timestamp: Utc::now(),
        });
    }
}

/// Flatten a workflow post-order, wiring child IDs into each parent.
fn plan_workflow(node: &Workflow, out: &mut Vec<Job>) -> JobId {
    let dependencies = node
        .children
        .iter()
        .map(|child| plan_workflow(child, out))
        .collect();
    let job = Job::new(
        node.command.clone(),
        node.arguments.clone(),
        node.input.clone(),
        dependencies,
    );
    let id = job.id;
    out.push(job);
    id
}
