//! Runner pool actor: claims jobs and dispatches them to task handlers.
//!
//! The pool is a pull scheduler. Each `CheckCapacity` message claims at most
//! one job. Wake-ups from the queue and every finished task send another
//! `CheckCapacity`, so concurrency is bounded only by the queue's host limits.
//! The actor mailbox serializes capacity checks; task execution runs outside it.

use std::sync::Arc;

use mediaq_core::{Job, JobId, JobState};
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::{DispatchError, PoolError, QueueError};
use crate::handler::{HandlerLock, TaskRegistry};
use crate::messages::RunnerMessage;
use crate::queue::JobQueue;

/// Runner pool arguments.
pub struct RunnerArgs {
    pub queue: JobQueue,
    pub registry: Arc<TaskRegistry>,
    pub wake_rx: mpsc::Receiver<JobId>,
}

/// State for the runner pool actor.
pub struct RunnerState {
    queue: JobQueue,
    registry: Arc<TaskRegistry>,
    handler_lock: HandlerLock,
    /// Stops the wake-up forwarder and any further claims.
    shutdown: CancellationToken,
    dispatched: u64,
}

/// Runner pool actor.
pub struct RunnerPool;

impl Actor for RunnerPool {
    type Msg = RunnerMessage;
    type State = RunnerState;
    type Arguments = RunnerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            "Starting runner pool with tasks: {}",
            args.registry.commands().join(", ")
        );

        let shutdown = CancellationToken::new();
        tokio::spawn(forward_wakeups(myself, args.wake_rx, shutdown.clone()));

        Ok(RunnerState {
            queue: args.queue,
            registry: args.registry,
            handler_lock: Arc::new(Mutex::new(())),
            shutdown,
            dispatched: 0,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            RunnerMessage::CheckCapacity => {
                if state.shutdown.is_cancelled() {
                    return Ok(());
                }

                if let Some(job) = state.queue.claim_job().await {
                    state.dispatched += 1;
                    tracing::info!(
                        "Dispatching job {} ({}) [#{}]",
                        job.id,
                        job.command,
                        state.dispatched
                    );

                    let queue = state.queue.clone();
                    let registry = state.registry.clone();
                    let lock = state.handler_lock.clone();
                    tokio::spawn(async move {
                        run_job(job, queue, registry, lock).await;
                        // Completion cascade: a freed slot may admit another job.
                        let _ = myself.send_message(RunnerMessage::CheckCapacity);
                    });
                }
            }

            RunnerMessage::Shutdown => {
                tracing::info!(
                    "Shutting down runner pool after {} dispatches",
                    state.dispatched
                );
                state.shutdown.cancel();
                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.shutdown.cancel();
        Ok(())
    }
}

/// Turn queue wake-ups into capacity checks until shutdown.
async fn forward_wakeups(
    pool: ActorRef<RunnerMessage>,
    mut wake_rx: mpsc::Receiver<JobId>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            signal = wake_rx.recv() => match signal {
                Some(job_id) => {
                    tracing::trace!("Wake-up for job {}", job_id);
                    if pool.send_message(RunnerMessage::CheckCapacity).is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }
    tracing::debug!("Wake-up forwarder stopped");
}

/// Execute one claimed job and turn any failure into a terminal state.
async fn run_job(job: Job, queue: JobQueue, registry: Arc<TaskRegistry>, lock: HandlerLock) {
    let id = job.id;

    match execute(&job, &queue, &registry, lock).await {
        Ok(()) => {
            if let Some(current) = queue.get_job(id).await
                && current.state == JobState::InProgress
            {
                tracing::warn!(
                    "Task {} returned without finishing job {}",
                    current.command,
                    id
                );
            }
        }

        Err(DispatchError::UnknownTask(command)) => {
            tracing::warn!("No task registered for {} (job {})", command, id);
            let reason = DispatchError::UnknownTask(command).to_string();
            record(id, queue.push_job_stdout(id, reason).await);
            record(id, queue.error_job(id).await);
        }

        Err(e @ DispatchError::Handler(_)) => {
            if job.is_cancelled() {
                tracing::info!("Job {} stopped after cancellation: {}", id, e);
                // Usually already cancelled by whoever fired the token.
                match queue.cancel_job(id).await {
                    Ok(()) | Err(QueueError::InvalidTransition(_)) => {}
                    Err(other) => record(id, Err(other)),
                }
            } else if queue
                .get_job(id)
                .await
                .is_some_and(|current| current.state == JobState::InProgress)
            {
                tracing::warn!("Job {} failed: {}", id, e);
                record(id, queue.push_job_stdout(id, e.to_string()).await);
                record(id, queue.error_job(id).await);
            } else {
                tracing::warn!("Job {} failed after it was finished: {}", id, e);
            }
        }
    }
}

async fn execute(
    job: &Job,
    queue: &JobQueue,
    registry: &TaskRegistry,
    lock: HandlerLock,
) -> Result<(), DispatchError> {
    let handler = registry
        .get(&job.command)
        .ok_or_else(|| DispatchError::UnknownTask(job.command.clone()))?;

    // Run on its own task so a panicking handler still ends in a job state.
    match tokio::spawn(handler.handle(job.clone(), queue.clone(), lock)).await {
        Ok(result) => result.map_err(DispatchError::Handler),
        Err(e) => Err(DispatchError::Handler(format!("task panicked: {}", e))),
    }
}

fn record(id: JobId, result: Result<(), QueueError>) {
    if let Err(e) = result {
        tracing::debug!("Could not record outcome for job {}: {}", id, e);
    }
}

/// Handle to a running pool.
pub struct RunnerHandle {
    actor: ActorRef<RunnerMessage>,
    join: tokio::task::JoinHandle<()>,
}

impl RunnerHandle {
    /// Ask the pool to try claiming a job now.
    pub fn check_capacity(&self) -> Result<(), PoolError> {
        self.actor
            .send_message(RunnerMessage::CheckCapacity)
            .map_err(|e| PoolError::Messaging(e.to_string()))
    }

    /// Stop scheduling new jobs. Running tasks are left to finish on their own.
    pub fn shutdown(&self) {
        let _ = self.actor.send_message(RunnerMessage::Shutdown);
    }

    /// Wait for the pool actor to stop.
    pub async fn join(self) {
        let _ = self.join.await;
    }
}

/// Start a runner pool draining `queue` with the handlers in `registry`.
pub async fn start_runner_pool(
    queue: JobQueue,
    registry: TaskRegistry,
) -> Result<RunnerHandle, PoolError> {
    let wake_rx = queue
        .take_wake_receiver()
        .await
        .ok_or(PoolError::WakeReceiverTaken)?;

    let args = RunnerArgs {
        queue,
        registry: Arc::new(registry),
        wake_rx,
    };
    let (actor, join) = Actor::spawn(None, RunnerPool, args).await?;

    // Catch up on work whose wake-up was dropped before we started.
    let _ = actor.send_message(RunnerMessage::CheckCapacity);

    Ok(RunnerHandle { actor, join })
}
