//! Queue configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Ceiling applied to any host without an explicit limit.
pub const DEFAULT_HOST_LIMIT: usize = 1;

/// Configuration for queue behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Capacity of the wake-up channel. Signals beyond it are dropped.
    pub wake_capacity: usize,
    /// Buffer size of the event broadcaster.
    pub event_capacity: usize,
    /// Initial per-host concurrency limits.
    pub host_limits: HashMap<String, usize>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            wake_capacity: 100,
            event_capacity: 1024,
            host_limits: HashMap::new(),
        }
    }
}

impl QueueConfig {
    /// Set the concurrency limit for a host.
    pub fn with_host_limit(mut self, host: impl Into<String>, limit: usize) -> Self {
        self.host_limits.insert(host.into(), limit);
        self
    }

    /// Set the wake-up channel capacity.
    pub fn with_wake_capacity(mut self, capacity: usize) -> Self {
        self.wake_capacity = capacity;
        self
    }
}
