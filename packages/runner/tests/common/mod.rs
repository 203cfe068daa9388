#![allow(dead_code)]

use std::time::Duration;

use mediaq_core::{Job, JobId, JobState};
use runner::{FnHandler, HandlerFuture, HandlerLock, JobQueue, QueueConfig};

pub async fn memory_queue() -> JobQueue {
    JobQueue::in_memory(QueueConfig::default()).await
}

/// Poll until `id` reaches `state`, or give up after a few seconds.
pub async fn wait_for_state(queue: &JobQueue, id: JobId, state: JobState) -> Result<Job, String> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let job = queue
            .get_job(id)
            .await
            .ok_or_else(|| format!("job {} disappeared", id))?;
        if job.state == state {
            return Ok(job);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(format!("job {} stuck in {} waiting for {}", id, job.state, state));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Handler that writes one line and completes its job.
pub fn completing_handler(
    command: &str,
) -> FnHandler<impl Fn(Job, JobQueue, HandlerLock) -> HandlerFuture + Send + Sync + 'static> {
    FnHandler::new(command, |job: Job, queue: JobQueue, _lock: HandlerLock| -> HandlerFuture {
        Box::pin(async move {
            queue
                .push_job_stdout(job.id, format!("ran {}", job.command))
                .await
                .map_err(|e| e.to_string())?;
            queue.complete_job(job.id).await.map_err(|e| e.to_string())
        })
    })
}
