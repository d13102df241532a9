//! Signals, actions and the interaction record observed by agents.

use im::OrdMap;
use serde::{Deserialize, Serialize};

use super::tensor::Tensor;

/// Named input signals (environment state as seen by the agent).
pub type Signals = OrdMap<String, Tensor>;

/// Named discrete actions chosen by the agent.
pub type Actions = OrdMap<String, i32>;

/// One immutable agent-environment interaction.
///
/// Uses `im` maps so results can be cloned into trajectories cheaply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// State before acting.
    pub s0: Signals,

    /// Actions taken.
    pub actions: Actions,

    /// Reward received for the transition.
    pub reward: f64,

    /// State after acting.
    pub s1: Signals,

    /// True if `s1` ends an episode.
    pub terminal: bool,
}

impl ExecutionResult {
    /// Create a non-terminal result.
    pub fn new(s0: Signals, actions: Actions, reward: f64, s1: Signals) -> Self {
        Self {
            s0,
            actions,
            reward,
            s1,
            terminal: false,
        }
    }

    /// Mark the result as terminal.
    #[must_use]
    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    /// Get the action chosen for a given output, if any.
    #[must_use]
    pub fn action(&self, name: &str) -> Option<i32> {
        self.actions.get(name).copied()
    }
}
