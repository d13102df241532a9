//! Trajectory of observed interactions pending training.
//!
//! Backed by `im::Vector`, so agents can hand their trajectory to a
//! background training pass in O(1) while they keep observing.

use im::Vector;
use serde::{Deserialize, Serialize};

use super::result::ExecutionResult;

/// Ordered sequence of execution results collected since the last pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    steps: Vector<ExecutionResult>,
}

impl Trajectory {
    /// Create an empty trajectory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a result, returning the extended trajectory.
    #[must_use]
    pub fn pushed(&self, result: ExecutionResult) -> Self {
        let mut steps = self.steps.clone();
        steps.push_back(result);
        Self { steps }
    }

    /// Add a result in place.
    pub fn push(&mut self, result: ExecutionResult) {
        self.steps.push_back(result);
    }

    /// Get the number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if trajectory is empty.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Returns the last `max_steps` results.
    ///
    /// Older results are dropped; a shorter trajectory is returned whole.
    #[must_use]
    pub fn clipped(&self, max_steps: usize) -> Self {
        let len = self.steps.len();
        if len <= max_steps {
            self.clone()
        } else {
            Self {
                steps: self.steps.skip(len - max_steps),
            }
        }
    }

    /// Iterate over the results, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.steps.iter()
    }

    /// Get a result by position.
    pub fn get(&self, index: usize) -> Option<&ExecutionResult> {
        self.steps.get(index)
    }

    /// Sum of rewards over the trajectory.
    pub fn total_reward(&self) -> f64 {
        self.steps.iter().map(|r| r.reward).sum()
    }
}

impl FromIterator<ExecutionResult> for Trajectory {
    fn from_iter<I: IntoIterator<Item = ExecutionResult>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}
