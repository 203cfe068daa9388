//! Task handler trait and registry.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use mediaq_core::Job;
use tokio::sync::Mutex;

use crate::queue::JobQueue;

/// Result type for task handlers. The error is a human-readable reason.
pub type HandlerResult = Result<(), String>;

/// Future type for async task handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Lock shared by every dispatched task, for handlers that need to serialize
/// multi-step finalization.
pub type HandlerLock = Arc<Mutex<()>>;

/// Trait for task handlers.
///
/// A handler must eventually call exactly one of `complete_job`, `error_job`
/// or `cancel_job` for its job; returning `Ok(())` alone does not finish it.
/// Handlers are expected to watch `job.cancel_token()` and return promptly
/// once it fires.
pub trait TaskHandler: Send + Sync + 'static {
    /// The command this handler runs.
    fn command(&self) -> &str;

    /// Run the task for `job`.
    fn handle(&self, job: Job, queue: JobQueue, lock: HandlerLock) -> HandlerFuture;
}

/// Registry for task handlers, keyed by command.
#[derive(Default)]
pub struct TaskRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("commands", &self.commands())
            .finish()
    }
}

impl TaskRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for its command, replacing any previous one.
    pub fn register<H: TaskHandler>(&mut self, handler: H) {
        let command = handler.command().to_string();
        if self.handlers.insert(command.clone(), Arc::new(handler)).is_some() {
            tracing::warn!("Replaced task handler for {}", command);
        }
    }

    /// Get a handler for a command.
    pub fn get(&self, command: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(command).cloned()
    }

    /// Check if a handler exists for a command.
    pub fn has_handler(&self, command: &str) -> bool {
        self.handlers.contains_key(command)
    }

    /// List all registered commands, sorted.
    pub fn commands(&self) -> Vec<&str> {
        let mut commands: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        commands.sort_unstable();
        commands
    }
}

/// A simple function-based task handler.
pub struct FnHandler<F>
where
    F: Fn(Job, JobQueue, HandlerLock) -> HandlerFuture + Send + Sync + 'static,
{
    command: String,
    handler: F,
}

impl<F> FnHandler<F>
where
    F: Fn(Job, JobQueue, HandlerLock) -> HandlerFuture + Send + Sync + 'static,
{
    /// Create a new function-based handler.
    pub fn new(command: impl Into<String>, handler: F) -> Self {
        Self {
            command: command.into(),
            handler,
        }
    }
}

impl<F> TaskHandler for FnHandler<F>
where
    F: Fn(Job, JobQueue, HandlerLock) -> HandlerFuture + Send + Sync + 'static,
{
    fn command(&self) -> &str {
        &self.command
    }

    fn handle(&self, job: Job, queue: JobQueue, lock: HandlerLock) -> HandlerFuture {
        (self.handler)(job, queue, lock)
    }
}
