//! Environment-driven configuration for the daemon.

use db::DbConfig;
use runner::QueueConfig;

/// Daemon configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub db: DbConfig,
    pub queue: QueueConfig,
}

impl AppConfig {
    /// Read configuration from `MEDIAQ_*` environment variables.
    ///
    /// - `MEDIAQ_DB_ENDPOINT` (default `mem://`)
    /// - `MEDIAQ_DB_NAMESPACE`, `MEDIAQ_DB_DATABASE`
    /// - `MEDIAQ_HOST_LIMITS`, e.g. `localhost=2,youtube.com=3`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut db = DbConfig::default();
        if let Some(endpoint) = lookup("MEDIAQ_DB_ENDPOINT") {
            db = db.with_endpoint(endpoint);
        }
        if let Some(namespace) = lookup("MEDIAQ_DB_NAMESPACE") {
            db = db.with_namespace(namespace);
        }
        if let Some(database) = lookup("MEDIAQ_DB_DATABASE") {
            db = db.with_database(database);
        }

        let mut queue = QueueConfig::default();
        if let Some(raw) = lookup("MEDIAQ_HOST_LIMITS") {
            for (host, limit) in parse_host_limits(&raw) {
                queue = queue.with_host_limit(host, limit);
            }
        }

        Self { db, queue }
    }
}

/// Parse `host=limit` pairs separated by commas. Malformed pairs are skipped.
fn parse_host_limits(raw: &str) -> Vec<(String, usize)> {
    raw.split(',')
        .filter_map(|pair| {
            let (host, limit) = pair.split_once('=')?;
            let host = host.trim().to_ascii_lowercase();
            match limit.trim().parse::<usize>() {
                Ok(limit) if !host.is_empty() => Some((host, limit)),
                _ => {
                    tracing::warn!("Ignoring malformed host limit: {:?}", pair);
                    None
                }
            }
        })
        .collect()
}
