//! Wall-clock checkpoint scheduling.
//!
//! Checkpoints piggy-back on training passes: the scheduler is only
//! consulted when a pass completes, so an agent that never becomes ready
//! to train is never saved through this path.

use std::time::{Duration, Instant};

/// Decides whether a training pass must persist the agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckpointScheduler {
    next_save: Instant,
    interval: Duration,
}

impl CheckpointScheduler {
    /// First checkpoint one interval from now.
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(Instant::now(), interval)
    }

    /// First checkpoint one interval after `start`.
    pub fn starting_at(start: Instant, interval: Duration) -> Self {
        Self {
            next_save: start + interval,
            interval,
        }
    }

    /// Check whether a checkpoint is due at `now`.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_save
    }

    /// Scheduler after a checkpoint written at `now`.
    #[must_use]
    pub fn rescheduled(&self, now: Instant) -> Self {
        Self {
            next_save: now + self.interval,
            interval: self.interval,
        }
    }

    /// Instant of the next checkpoint.
    #[must_use]
    pub fn next_save(&self) -> Instant {
        self.next_save
    }

    /// Interval between checkpoints.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time left before the next checkpoint is due.
    #[must_use]
    pub fn remaining(&self, now: Instant) -> Duration {
        self.next_save.saturating_duration_since(now)
    }
}
