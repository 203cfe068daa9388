//! Media job queue daemon.

mod config;
mod handlers;

use db::repositories::JobRepository;
use mediaq_core::JobEvent;
use runner::{JobQueue, start_runner_pool};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();
    tracing::info!("Initializing job queue...");

    let db = db::init(&config.db).await?;
    let queue = JobQueue::builder(config.queue.clone())
        .with_store(JobRepository::new(db))
        .build()
        .await;

    let stats = queue.stats().await;
    tracing::info!(
        "Queue ready: {} pending, {} finished",
        stats.pending,
        stats.total() - stats.active()
    );

    let pool = start_runner_pool(queue.clone(), handlers::demo_registry()).await?;

    tokio::spawn(log_events(queue.subscribe()));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down...");

    pool.shutdown();
    queue.persist_all().await;
    pool.join().await;

    tracing::info!("Job queue stopped");
    Ok(())
}

/// Log queue events until the queue goes away. Returns how many were logged.
async fn log_events(mut events: broadcast::Receiver<JobEvent>) -> usize {
    let mut logged = 0;
    loop {
        match events.recv().await {
            Ok(event) => {
                tracing::debug!("{}", event.description());
                logged += 1;
            }
            Err(RecvError::Lagged(missed)) => {
                tracing::debug!("Event log skipped {} events", missed);
            }
            Err(RecvError::Closed) => break,
        }
    }
    logged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mediaq_core::JobId;

    fn stdout_event(line: &str) -> JobEvent {
        JobEvent::Stdout {
            job_id: JobId::new(),
            line: line.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn event_log_survives_lag() {
        let (tx, rx) = broadcast::channel(1);
        for line in ["a", "b", "c"] {
            tx.send(stdout_event(line)).unwrap();
        }
        drop(tx);

        // "a" and "b" are overwritten; the logger keeps going and sees "c".
        assert_eq!(log_events(rx).await, 1);
    }
}
