//! Job counts for dashboards.

use serde::{Deserialize, Serialize};

use crate::JobState;

/// Number of jobs in each state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueStats {
    pub pending: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub errored: u64,
}

impl QueueStats {
    /// Count one job in `state`.
    pub fn record(&mut self, state: JobState) {
        match state {
            JobState::Pending => self.pending += 1,
            JobState::InProgress => self.in_progress += 1,
            JobState::Completed => self.completed += 1,
            JobState::Cancelled => self.cancelled += 1,
            JobState::Error => self.errored += 1,
        }
    }

    /// Jobs not yet in a terminal state.
    pub fn active(&self) -> u64 {
        self.pending + self.in_progress
    }

    /// All jobs known to the queue.
    pub fn total(&self) -> u64 {
        self.active() + self.completed + self.cancelled + self.errored
    }
}

impl FromIterator<JobState> for QueueStats {
    fn from_iter<I: IntoIterator<Item = JobState>>(iter: I) -> Self {
        let mut stats = Self::default();
        for state in iter {
            stats.record(state);
        }
        stats
    }
}
