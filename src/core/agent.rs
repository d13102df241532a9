//! The trainable agent contract consumed by the coordinator.
//!
//! Agents are immutable values: every operation that changes an agent
//! returns a new snapshot. The coordinator never inspects an agent's
//! internals; it only moves snapshots between the acting loop and the
//! training runner, which is why agents must be `Send + 'static`.

use im::OrdMap;

use super::error::Result;
use super::result::{Actions, ExecutionResult, Signals};
use super::trajectory::Trajectory;
use crate::kpi::KpiRecord;

/// Per-component learning-rate multipliers.
pub type Alphas = OrdMap<String, f32>;

/// A trainable decision-maker.
pub trait Agent: Clone + Send + 'static {
    /// Choose actions for the given state.
    fn act(&self, state: &Signals) -> Actions;

    /// Fold an interaction into the agent's experience.
    fn observe(&self, result: ExecutionResult) -> Self;

    /// Run one batch update over the given trajectory window.
    fn train_by_trajectory(&self, trajectory: &Trajectory) -> Result<Self>;

    /// Experience collected since the last training pass.
    fn trajectory(&self) -> &Trajectory;

    /// Replace the collected experience.
    fn with_trajectory(&self, trajectory: Trajectory) -> Self;

    /// Maximum number of steps trained in one pass.
    fn num_steps(&self) -> usize;

    /// True once enough experience is collected to train.
    fn is_ready_for_train(&self) -> bool;

    /// Global learning rate.
    fn eta(&self) -> f32;

    /// Change the global learning rate.
    fn with_eta(&self, eta: f32) -> Self;

    /// Per-component learning-rate multipliers.
    fn alphas(&self) -> &Alphas;

    /// Change the per-component learning-rate multipliers.
    fn with_alphas(&self, alphas: Alphas) -> Self;

    /// Returns a freshly initialised agent with the same hyper-parameters.
    fn init(&self) -> Self;

    /// Persist the trainable state.
    fn save(&self) -> Result<()>;

    /// Release any trailing resources.
    fn close(&self) -> Result<()>;

    /// Agent-specific indicators reported after each training pass.
    fn kpis(&self) -> KpiRecord {
        KpiRecord::new()
    }
}
