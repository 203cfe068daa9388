use db::repositories::JobRepository;
use db::{Database, DbConfig, DbError};

/// Fresh in-memory datastore with the schema in place.
pub async fn setup_db() -> Result<Database, DbError> {
    db::init(&DbConfig::memory()).await
}

#[allow(dead_code)]
pub async fn setup_repo() -> Result<JobRepository, DbError> {
    Ok(JobRepository::new(setup_db().await?))
}
