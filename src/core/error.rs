//! Error type shared by the coordinator, the runner and the KPI pipeline.

use std::time::Duration;

use thiserror::Error;

/// Errors raised while training, checkpointing or persisting KPIs.
#[derive(Debug, Error)]
pub enum TrainerError {
    /// The agent's batch update failed.
    #[error("training pass failed: {0}")]
    Training(String),

    /// Persisting the agent failed.
    #[error("checkpoint failed: {0}")]
    Checkpoint(String),

    /// The training pass panicked on the runner thread.
    #[error("training pass {task_id} panicked: {message}")]
    TrainingPanicked { task_id: u64, message: String },

    /// A training pass has been in flight longer than the watchdog allows.
    #[error("training pass {task_id} pending for {elapsed:?} (limit {limit:?})")]
    TrainingStalled {
        task_id: u64,
        elapsed: Duration,
        limit: Duration,
    },

    /// A previous training pass failed and the session cannot train any more.
    #[error("training halted after failure: {0}")]
    TrainingHalted(String),

    /// A KPI record could not be persisted.
    #[error("kpi write failed: {0}")]
    Kpi(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Encoding(#[from] bincode::Error),

    /// A KPI label is not a valid regular expression.
    #[error("invalid kpi label pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// The session is shutting down and refuses new interactions.
    #[error("session closed")]
    SessionClosed,

    /// A worker thread could not be started.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TrainerError>;
