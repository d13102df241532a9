//! Online training coordination.
//!
//! ## Overview
//!
//! - **CoordinatorState**: immutable snapshot of agent, pending pass and
//!   checkpoint schedule, advanced by pure transitions
//! - **TrainingJob**: a clipped trajectory window plus a cleared agent
//!   snapshot, runnable on any thread
//! - **TrainingRunner**: background thread executing jobs and reporting
//!   their outcomes
//! - **CheckpointScheduler**: wall-clock save deadline consulted after
//!   each pass
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rust_online_trainer::training::{CoordinatorState, TrainingRunner};
//!
//! let state = CoordinatorState::from_config(agent, &config);
//! let transition = state.observe_result(result)?;
//! if let Some(job) = transition.job {
//!     runner.submit(job)?;
//! }
//! // later, from the completion callback
//! let state = transition.state.on_training_task_complete(outcome);
//! ```

pub mod checkpoint;
pub mod coordinator;
pub mod runner;
pub mod stats;

pub use checkpoint::CheckpointScheduler;
pub use coordinator::{CoordinatorState, PendingTraining, TrainedOutcome, TrainingJob, Transition};
pub use runner::{TaskReport, TrainingRunner};
pub use stats::TrainingStats;
