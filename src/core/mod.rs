//! Core types: tensors, interaction records, trajectories, the agent
//! contract, configuration, errors and RNG.

pub mod agent;
pub mod config;
pub mod error;
pub mod result;
pub mod rng;
pub mod tensor;
pub mod trajectory;

pub use agent::{Agent, Alphas};
pub use config::{TrainerConfig, DEFAULT_KPI_CAPACITY, DEFAULT_SAVE_INTERVAL};
pub use error::{Result, TrainerError};
pub use result::{Actions, ExecutionResult, Signals};
pub use rng::AgentRng;
pub use tensor::{Shape, Tensor};
pub use trajectory::Trajectory;
