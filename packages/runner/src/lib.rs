//! Job queue and runner pool.
//!
//! This crate owns every job, decides which one may run next and drives the
//! registered task handlers.
//!
//! # Architecture
//!
//! - `JobQueue` - Owns all jobs; enforces dependency and per-host admission
//! - `TaskRegistry` - Maps commands to task handlers
//! - `RunnerPool` - Actor that claims jobs and dispatches them to handlers
//!
//! # Usage
//!
//! ```ignore
//! use runner::{JobQueue, QueueConfig, TaskRegistry, start_runner_pool};
//!
//! let queue = JobQueue::in_memory(QueueConfig::default()).await;
//! let pool = start_runner_pool(queue.clone(), registry).await?;
//!
//! queue.add_job("ingest", vec![], "https://example.com/video", vec![]).await;
//! ```

mod config;
mod error;
mod handler;
mod messages;
mod pool;
mod queue;

pub use config::{DEFAULT_HOST_LIMIT, QueueConfig};
pub use error::{DispatchError, PoolError, QueueError};
pub use handler::{FnHandler, HandlerFuture, HandlerLock, HandlerResult, TaskHandler, TaskRegistry};
pub use messages::RunnerMessage;
pub use pool::{RunnerHandle, RunnerPool, start_runner_pool};
pub use queue::{JobQueue, QueueBuilder};
