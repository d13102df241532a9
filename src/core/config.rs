//! Trainer configuration.
//!
//! Loading the configuration from files or command lines is up to the
//! host; this type only fixes the knobs and their defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{Result, TrainerError};

/// Default capacity of the KPI queue.
pub const DEFAULT_KPI_CAPACITY: usize = 1000;

/// Default interval between agent checkpoints.
pub const DEFAULT_SAVE_INTERVAL: Duration = Duration::from_secs(300);

/// Online training configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Run training passes on the acting thread.
    /// Slower, but deterministic; meant for debugging.
    pub synchronous_training: bool,

    /// Minimum wall-clock time between checkpoints.
    pub save_interval: Duration,

    /// Capacity of the KPI queue before the oldest records are dropped.
    pub kpi_buffer_capacity: usize,

    /// Directory receiving KPI files. `None` disables KPI persistence.
    pub kpi_path: Option<PathBuf>,

    /// KPI label selection ("all", "batch", "analysis", "default",
    /// or comma separated regular expressions).
    pub kpi_labels: String,

    /// Longest a training pass may stay in flight before the session
    /// reports it as stalled. `None` disables the watchdog.
    pub training_timeout: Option<Duration>,

    /// Longest shutdown waits for the KPI writer and the runner.
    /// `None` waits indefinitely.
    pub drain_timeout: Option<Duration>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            synchronous_training: false,
            save_interval: DEFAULT_SAVE_INTERVAL,
            kpi_buffer_capacity: DEFAULT_KPI_CAPACITY,
            kpi_path: None,
            kpi_labels: "default".to_string(),
            training_timeout: None,
            drain_timeout: None,
        }
    }
}

impl TrainerConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Train on the calling thread.
    pub fn with_synchronous_training(mut self, synchronous: bool) -> Self {
        self.synchronous_training = synchronous;
        self
    }

    /// Set the checkpoint interval.
    pub fn with_save_interval(mut self, interval: Duration) -> Self {
        self.save_interval = interval;
        self
    }

    /// Set the KPI queue capacity.
    pub fn with_kpi_buffer_capacity(mut self, capacity: usize) -> Self {
        self.kpi_buffer_capacity = capacity;
        self
    }

    /// Persist KPIs under the given directory.
    pub fn with_kpi_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.kpi_path = Some(path.into());
        self
    }

    /// Set the KPI label selection.
    pub fn with_kpi_labels(mut self, labels: impl Into<String>) -> Self {
        self.kpi_labels = labels.into();
        self
    }

    /// Enable the stalled-training watchdog.
    pub fn with_training_timeout(mut self, timeout: Duration) -> Self {
        self.training_timeout = Some(timeout);
        self
    }

    /// Bound the shutdown drain.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = Some(timeout);
        self
    }

    /// Check the configuration for values the session cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.kpi_buffer_capacity == 0 {
            return Err(TrainerError::Config(
                "kpi_buffer_capacity must be positive".to_string(),
            ));
        }
        if self.training_timeout == Some(Duration::ZERO) {
            return Err(TrainerError::Config(
                "training_timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
