//! # rust-online-trainer
//!
//! Asynchronous online training for agents that keep acting while they
//! learn.
//!
//! ## Design Principles
//!
//! 1. **Immutable Snapshots**: agents and coordinator state are values.
//!    Every operation returns a new snapshot; `im-rs` keeps clones O(1).
//!
//! 2. **One Pass In Flight**: a training pass runs in the background on a
//!    clipped window of recent experience, never two at a time. Acting
//!    continues on a cleared snapshot meanwhile.
//!
//! 3. **Telemetry Never Blocks**: KPI records go through a bounded
//!    drop-oldest queue drained by a dedicated writer thread.
//!
//! ## Architecture
//!
//! - **Reconciliation**: a background-trained agent is merged with the
//!   hyper-parameters and experience of the live agent, unless the agent
//!   was reset after the pass was launched (generation counter).
//!
//! - **Checkpoints**: written by the training pass once the save interval
//!   has elapsed.
//!
//! - **Shutdown**: close the agent, drain the KPI sink, stop the runner,
//!   with optional bounds on each wait.
//!
//! ## Modules
//!
//! - `core`: tensors, interaction records, trajectories, the `Agent` trait,
//!   configuration, errors, RNG
//! - `kpi`: KPI records, filters, writers and the bounded sink
//! - `training`: coordinator state machine, training jobs, runner,
//!   checkpoint scheduling
//! - `session`: the host-facing session and the interaction loop
//! - `agents`: reference tabular agent

pub mod agents;
pub mod core;
pub mod kpi;
pub mod session;
pub mod training;

// Re-export commonly used types
pub use crate::core::{
    Actions, Agent, AgentRng, Alphas, ExecutionResult, Result, Signals, Tensor, TrainerConfig,
    TrainerError, Trajectory,
};

pub use crate::kpi::{BinKpiWriter, CompletionGate, KpiFilter, KpiRecord, KpiSink, KpiWriter, SinkStats};

pub use crate::training::{
    CheckpointScheduler, CoordinatorState, TrainedOutcome, TrainingJob, TrainingRunner, TrainingStats,
    Transition,
};

pub use crate::session::{Environment, InteractionLoop, LoopConfig, LoopStats, Session, ShutdownReport};

pub use crate::agents::TabularAgent;
