//! Demo task handlers.

use std::time::Duration;

use mediaq_core::Job;
use runner::{FnHandler, HandlerFuture, HandlerLock, JobQueue, TaskRegistry};

/// Registry with the built-in demo tasks.
pub fn demo_registry() -> TaskRegistry {
    let mut handlers = TaskRegistry::new();

    // Echo: stream each input line back as stdout.
    handlers.register(FnHandler::new(
        "echo",
        |job: Job, queue: JobQueue, _lock: HandlerLock| -> HandlerFuture {
            Box::pin(async move {
                for line in job.input.lines() {
                    queue
                        .push_job_stdout(job.id, line)
                        .await
                        .map_err(|e| e.to_string())?;
                }
                queue.complete_job(job.id).await.map_err(|e| e.to_string())
            })
        },
    ));

    // Sleep: wait `arguments[0]` seconds (default 5), stopping early on cancel.
    handlers.register(FnHandler::new(
        "sleep",
        |job: Job, queue: JobQueue, _lock: HandlerLock| -> HandlerFuture {
            Box::pin(async move {
                let seconds = job
                    .arguments
                    .first()
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(5);
                tracing::info!("Sleeping for {} seconds", seconds);

                tokio::select! {
                    _ = job.cancel_token().cancelled() => {
                        return Err("cancelled".to_string());
                    }
                    _ = tokio::time::sleep(Duration::from_secs(seconds)) => {}
                }

                queue
                    .push_job_stdout(job.id, format!("Slept for {} seconds", seconds))
                    .await
                    .map_err(|e| e.to_string())?;
                queue.complete_job(job.id).await.map_err(|e| e.to_string())
            })
        },
    ));

    handlers
}
