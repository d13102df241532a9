//! Tabular action-value agent.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use im::{OrdMap, Vector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::{
    Actions, Agent, AgentRng, Alphas, ExecutionResult, Result, Signals, Tensor, TrainerError,
    Trajectory,
};
use crate::kpi::KpiRecord;

/// Alpha key scaling the value update.
pub const CRITIC_ALPHA: &str = "critic";

/// Persisted part of a [`TabularAgent`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct Checkpoint {
    values: Vector<f32>,
    avg_reward: f32,
    passes: u64,
}

/// Running action-value estimates with epsilon-greedy acting.
///
/// Each trained step moves the value of the chosen action towards the
/// observed reward by `eta * alphas["critic"]`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TabularAgent {
    output: String,
    values: Vector<f32>,
    avg_reward: f32,
    passes: u64,
    observed: u64,
    trajectory: Trajectory,
    num_steps: usize,
    batch_size: usize,
    eta: f32,
    alphas: Alphas,
    epsilon: f64,
    seed: u64,
    checkpoint_path: Option<PathBuf>,
}

impl TabularAgent {
    /// Start configuring an agent.
    pub fn builder() -> TabularAgentBuilder {
        TabularAgentBuilder::new()
    }

    /// Value estimate per action.
    pub fn values(&self) -> &Vector<f32> {
        &self.values
    }

    /// Mean reward of the last trained window.
    pub fn avg_reward(&self) -> f32 {
        self.avg_reward
    }

    /// Number of completed training passes.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Name of the action output.
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Number of actions.
    pub fn action_count(&self) -> usize {
        self.values.len()
    }

    /// Exploration probability.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Index of the best valued action; ties go to the lowest index.
    pub fn greedy_action(&self) -> usize {
        let mut best = 0;
        for (i, value) in self.values.iter().enumerate() {
            if *value > self.values[best] {
                best = i;
            }
        }
        best
    }

    /// Restore trained values from a checkpoint written by `save`.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| TrainerError::Checkpoint(format!("{}: {e}", path.display())))?;
        let checkpoint: Checkpoint = bincode::deserialize_from(BufReader::new(file))?;
        if checkpoint.values.len() != self.values.len() {
            return Err(TrainerError::Checkpoint(format!(
                "{}: {} actions, expected {}",
                path.display(),
                checkpoint.values.len(),
                self.values.len()
            )));
        }
        Ok(Self {
            values: checkpoint.values,
            avg_reward: checkpoint.avg_reward,
            passes: checkpoint.passes,
            ..self.clone()
        })
    }

    fn action_of(&self, result: &ExecutionResult) -> Option<usize> {
        let action = result.action(&self.output)?;
        usize::try_from(action).ok().filter(|a| *a < self.values.len())
    }
}

impl Agent for TabularAgent {
    fn act(&self, _state: &Signals) -> Actions {
        let mut rng = AgentRng::for_step(self.seed, self.observed);
        let action = if rng.gen_bool(self.epsilon) {
            rng.gen_range_usize(0..self.values.len())
        } else {
            self.greedy_action()
        };
        OrdMap::unit(self.output.clone(), action as i32)
    }

    fn observe(&self, result: ExecutionResult) -> Self {
        Self {
            trajectory: self.trajectory.pushed(result),
            observed: self.observed + 1,
            ..self.clone()
        }
    }

    fn train_by_trajectory(&self, trajectory: &Trajectory) -> Result<Self> {
        let rate = self.eta * self.alphas.get(CRITIC_ALPHA).copied().unwrap_or(1.0);
        let mut values = self.values.clone();
        let mut skipped = 0;
        for result in trajectory.iter() {
            let Some(action) = self.action_of(result) else {
                skipped += 1;
                continue;
            };
            let value = values[action];
            values.set(action, value + rate * (result.reward as f32 - value));
        }
        if skipped > 0 {
            debug!(skipped, output = %self.output, "Steps without a valid action ignored");
        }

        let avg_reward = if trajectory.is_empty() {
            self.avg_reward
        } else {
            (trajectory.total_reward() / trajectory.len() as f64) as f32
        };
        Ok(Self {
            values,
            avg_reward,
            passes: self.passes + 1,
            ..self.clone()
        })
    }

    fn trajectory(&self) -> &Trajectory {
        &self.trajectory
    }

    fn with_trajectory(&self, trajectory: Trajectory) -> Self {
        Self {
            trajectory,
            ..self.clone()
        }
    }

    fn num_steps(&self) -> usize {
        self.num_steps
    }

    fn is_ready_for_train(&self) -> bool {
        self.trajectory.len() >= self.batch_size
    }

    fn eta(&self) -> f32 {
        self.eta
    }

    fn with_eta(&self, eta: f32) -> Self {
        Self { eta, ..self.clone() }
    }

    fn alphas(&self) -> &Alphas {
        &self.alphas
    }

    fn with_alphas(&self, alphas: Alphas) -> Self {
        Self {
            alphas,
            ..self.clone()
        }
    }

    fn init(&self) -> Self {
        Self {
            values: Vector::from(vec![0.0; self.values.len()]),
            avg_reward: 0.0,
            passes: 0,
            trajectory: Trajectory::new(),
            ..self.clone()
        }
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.checkpoint_path else {
            return Ok(());
        };
        let checkpoint = Checkpoint {
            values: self.values.clone(),
            avg_reward: self.avg_reward,
            passes: self.passes,
        };
        let file = File::create(path)
            .map_err(|e| TrainerError::Checkpoint(format!("{}: {e}", path.display())))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, &checkpoint)?;
        writer.flush()?;
        debug!(path = %path.display(), passes = self.passes, "Agent saved");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn kpis(&self) -> KpiRecord {
        KpiRecord::new()
            .with("avgReward", Tensor::scalar(self.avg_reward))
            .with("values", Tensor::vector(self.values.iter().copied().collect()))
    }
}

/// Builder for [`TabularAgent`].
#[derive(Clone, Debug)]
pub struct TabularAgentBuilder {
    output: String,
    actions: usize,
    num_steps: usize,
    batch_size: usize,
    eta: f32,
    alphas: Alphas,
    epsilon: f64,
    seed: u64,
    checkpoint_path: Option<PathBuf>,
}

impl Default for TabularAgentBuilder {
    fn default() -> Self {
        Self {
            output: "action".to_string(),
            actions: 2,
            num_steps: 100,
            batch_size: 100,
            eta: 0.1,
            alphas: OrdMap::unit(CRITIC_ALPHA.to_string(), 1.0),
            epsilon: 0.1,
            seed: 0,
            checkpoint_path: None,
        }
    }
}

impl TabularAgentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(mut self, name: impl Into<String>) -> Self {
        self.output = name.into();
        self
    }

    pub fn actions(mut self, count: usize) -> Self {
        self.actions = count;
        self
    }

    /// Maximum steps trained per pass.
    pub fn num_steps(mut self, steps: usize) -> Self {
        self.num_steps = steps;
        self
    }

    /// Steps to collect before the agent asks to train.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn eta(mut self, eta: f32) -> Self {
        self.eta = eta;
        self
    }

    pub fn alphas(mut self, alphas: Alphas) -> Self {
        self.alphas = alphas;
        self
    }

    pub fn epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// File written by `save`. Without one, `save` does nothing.
    pub fn checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<TabularAgent> {
        if self.actions == 0 {
            return Err(TrainerError::Config("agent needs at least one action".to_string()));
        }
        if self.num_steps == 0 || self.batch_size == 0 {
            return Err(TrainerError::Config(
                "num_steps and batch_size must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(TrainerError::Config(format!(
                "epsilon must be within [0, 1], got {}",
                self.epsilon
            )));
        }
        Ok(TabularAgent {
            output: self.output,
            values: Vector::from(vec![0.0; self.actions]),
            avg_reward: 0.0,
            passes: 0,
            observed: 0,
            trajectory: Trajectory::new(),
            num_steps: self.num_steps,
            batch_size: self.batch_size,
            eta: self.eta,
            alphas: self.alphas,
            epsilon: self.epsilon,
            seed: self.seed,
            checkpoint_path: self.checkpoint_path,
        })
    }
}
