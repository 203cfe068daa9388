#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;

use db::DbConfig;
use db::repositories::JobRepository;
use mediaq_core::{JobState, LOCAL_HOST};
use runner::{JobQueue, QueueConfig};

async fn memory_repo() -> Result<JobRepository, Box<dyn Error>> {
    let db_conn = db::connect(&DbConfig::memory()).await?;
    Ok(JobRepository::new(db_conn))
}

async fn persistent_queue(repo: &JobRepository) -> JobQueue {
    JobQueue::builder(QueueConfig::default())
        .with_store(repo.clone())
        .build()
        .await
}

#[tokio::test]
async fn test_interrupted_job_is_requeued_on_restart() -> Result<(), Box<dyn Error>> {
    let repo = memory_repo().await?;

    let before = persistent_queue(&repo).await;
    let id = before.add_job("metadata", vec![], "/media/a.mkv", vec![]).await;
    before.claim_job().await.ok_or("claim")?;
    before.push_job_stdout(id, "halfway").await?;
    drop(before);

    let after = persistent_queue(&repo).await;
    let job = after.get_job(id).await.ok_or("job not restored")?;
    assert_eq!(job.state, JobState::Pending);
    assert!(job.claimed_at.is_none());
    assert_eq!(job.stdout, vec!["halfway".to_string()]);
    assert_eq!(after.running_count(LOCAL_HOST).await, 0);

    // The demotion itself was written back.
    let stored = repo.load_all().await?;
    assert_eq!(stored[0].job.state, JobState::Pending);
    assert!(stored[0].job.claimed_at.is_none());

    // Recovered jobs are signalled so a pool picks them up unprompted.
    let mut wake_rx = after.take_wake_receiver().await.ok_or("receiver")?;
    assert_eq!(wake_rx.try_recv().ok(), Some(id));

    assert_eq!(after.claim_job().await.map(|j| j.id), Some(id));
    Ok(())
}

#[tokio::test]
async fn test_restart_restores_order_and_terminal_states() -> Result<(), Box<dyn Error>> {
    let repo = memory_repo().await?;

    let before = persistent_queue(&repo).await;
    let a = before.add_job("metadata", vec![], "/a", vec![]).await;
    let b = before.add_job("metadata", vec![], "/b", vec![a]).await;
    let c = before.add_job("metadata", vec![], "/c", vec![]).await;
    before.claim_job().await.ok_or("claim")?;
    before.complete_job(a).await?;
    before.remove_job(c).await?;
    let d = before.add_job("metadata", vec![], "/d", vec![]).await;
    drop(before);

    let after = persistent_queue(&repo).await;
    let jobs = after.list_jobs().await;
    let ids: Vec<_> = jobs.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![a, b, d]);
    assert_eq!(jobs[0].state, JobState::Completed);
    assert!(jobs[0].completed_at.is_some());
    assert_eq!(jobs[1].dependencies, vec![a]);

    // New jobs land after everything restored.
    let e = after.add_job("metadata", vec![], "/e", vec![]).await;
    assert_eq!(after.list_jobs().await.last().map(|j| j.id), Some(e));

    // Dependency on a restored completed job is satisfied.
    assert_eq!(after.claim_job().await.map(|j| j.id), Some(b));
    Ok(())
}

#[tokio::test]
async fn test_clear_deletes_from_store() -> Result<(), Box<dyn Error>> {
    let repo = memory_repo().await?;
    let queue = persistent_queue(&repo).await;

    let running = queue.add_job("metadata", vec![], "/a", vec![]).await;
    queue.add_job("metadata", vec![], "/b", vec![]).await;
    queue.claim_job().await.ok_or("claim")?;

    assert_eq!(queue.clear_non_running_jobs().await, 1);
    let stored = repo.load_all().await?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].job.id, running);
    Ok(())
}

#[tokio::test]
async fn test_persist_all_flushes_every_job() -> Result<(), Box<dyn Error>> {
    let repo = memory_repo().await?;
    let queue = persistent_queue(&repo).await;
    queue.add_job("metadata", vec![], "/a", vec![]).await;
    queue.add_job("metadata", vec![], "/b", vec![]).await;

    assert_eq!(queue.persist_all().await, 2);
    assert_eq!(repo.load_all().await?.len(), 2);

    let memory_only = common::memory_queue().await;
    memory_only.add_job("metadata", vec![], "/a", vec![]).await;
    assert_eq!(memory_only.persist_all().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_failing_store_keeps_queue_working() -> Result<(), Box<dyn Error>> {
    let db_conn = db::connect(&DbConfig::memory()).await?;
    // A conflicting field type makes every job upsert fail.
    db_conn
        .query("DEFINE TABLE job SCHEMAFULL; DEFINE FIELD job_id ON job TYPE int;")
        .await?
        .check()?;
    let repo = JobRepository::new(db_conn);
    let queue = persistent_queue(&repo).await;

    let id = queue.add_job("metadata", vec![], "/media/a.mkv", vec![]).await;
    assert_eq!(queue.claim_job().await.map(|j| j.id), Some(id));
    queue.push_job_stdout(id, "done").await?;
    queue.complete_job(id).await?;

    let job = queue.get_job(id).await.ok_or("missing")?;
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.stdout, vec!["done".to_string()]);
    assert!(repo.load_all().await?.is_empty());
    assert_eq!(queue.persist_all().await, 0);
    Ok(())
}
