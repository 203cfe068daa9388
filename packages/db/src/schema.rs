//! Database schema definitions using SurrealQL.

use crate::{Database, DbError};

/// Initialize the database schema.
///
/// Idempotent: every definition uses `IF NOT EXISTS`.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    db.query(JOB_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Job table schema.
///
/// `arguments`, `stdout` and `dependencies` hold JSON arrays; `state` is the
/// integer encoding of `JobState`. `job_order_position` only exists to rebuild
/// claim order on load.
const JOB_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job SCHEMAFULL;

DEFINE FIELD IF NOT EXISTS job_id ON job TYPE string;
DEFINE FIELD IF NOT EXISTS command ON job TYPE string;
DEFINE FIELD IF NOT EXISTS arguments ON job TYPE string DEFAULT "[]";
DEFINE FIELD IF NOT EXISTS input ON job TYPE string DEFAULT "";
DEFINE FIELD IF NOT EXISTS host ON job TYPE string;
DEFINE FIELD IF NOT EXISTS stdout ON job TYPE string DEFAULT "[]";
DEFINE FIELD IF NOT EXISTS dependencies ON job TYPE string DEFAULT "[]";
DEFINE FIELD IF NOT EXISTS state ON job TYPE int DEFAULT 0;
DEFINE FIELD IF NOT EXISTS created_at ON job TYPE string;
DEFINE FIELD IF NOT EXISTS claimed_at ON job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS completed_at ON job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS errored_at ON job TYPE option<string>;
DEFINE FIELD IF NOT EXISTS job_order_position ON job TYPE int;

DEFINE INDEX IF NOT EXISTS job_order ON job FIELDS job_order_position;
DEFINE INDEX IF NOT EXISTS job_state ON job FIELDS state;
"#;
