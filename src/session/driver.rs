//! Acting loop driving an environment through a session.

use tracing::{debug, info};

use super::host::Session;
use crate::core::{Actions, Agent, ExecutionResult, Result, Signals};

/// Source of interactions for the acting loop.
pub trait Environment {
    /// Current state, or `None` once the environment has ended.
    fn observe(&mut self) -> Option<Signals>;

    /// Apply the chosen actions and report the resulting interaction.
    fn execute(&mut self, actions: &Actions) -> Result<ExecutionResult>;
}

/// Configuration for the interaction loop.
#[derive(Clone, Debug)]
pub struct LoopConfig {
    /// Maximum number of steps to run. 0 = until the environment ends.
    pub max_steps: usize,

    /// Steps between session health checks. 0 is treated as 1.
    pub health_check_interval: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_steps: 0,
            health_check_interval: 1,
        }
    }
}

impl LoopConfig {
    /// Create a new loop config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum steps.
    pub fn with_max_steps(mut self, max: usize) -> Self {
        self.max_steps = max;
        self
    }

    /// Set the number of steps between health checks.
    pub fn with_health_check_interval(mut self, interval: usize) -> Self {
        self.health_check_interval = interval.max(1);
        self
    }
}

/// Why the loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The environment reported no further state.
    EnvironmentEnded,
    /// `max_steps` reached.
    StepLimit,
}

/// Summary of a loop run.
#[derive(Clone, Debug, PartialEq)]
pub struct LoopStats {
    pub steps: usize,
    pub episodes: usize,
    pub total_reward: f64,
    pub stop: StopReason,
}

impl LoopStats {
    /// Mean reward per step.
    pub fn average_reward(&self) -> f64 {
        if self.steps == 0 {
            0.0
        } else {
            self.total_reward / self.steps as f64
        }
    }
}

/// Runs act/execute/observe cycles until the environment ends.
///
/// Stops with an error as soon as the session reports a failed or stalled
/// training pass, or the environment fails.
pub struct InteractionLoop<'a, A: Agent, E: Environment> {
    session: &'a Session<A>,
    environment: E,
    config: LoopConfig,
}

impl<'a, A: Agent, E: Environment> InteractionLoop<'a, A, E> {
    /// Create a new loop.
    pub fn new(session: &'a Session<A>, environment: E, config: LoopConfig) -> Self {
        Self {
            session,
            environment,
            config,
        }
    }

    /// Run a single step. Returns `None` once the environment has ended.
    pub fn step(&mut self) -> Result<Option<ExecutionResult>> {
        let Some(state) = self.environment.observe() else {
            return Ok(None);
        };
        let actions = self.session.act(&state);
        let result = self.environment.execute(&actions)?;
        self.session.observe_result(result.clone())?;
        Ok(Some(result))
    }

    /// Run steps until the environment ends or `max_steps` is reached.
    pub fn run(&mut self) -> Result<LoopStats> {
        let mut stats = LoopStats {
            steps: 0,
            episodes: 0,
            total_reward: 0.0,
            stop: StopReason::EnvironmentEnded,
        };

        let interval = self.config.health_check_interval.max(1);
        loop {
            if self.config.max_steps > 0 && stats.steps >= self.config.max_steps {
                stats.stop = StopReason::StepLimit;
                break;
            }
            if stats.steps % interval == 0 {
                self.session.check_health()?;
            }

            let Some(result) = self.step()? else {
                break;
            };
            stats.steps += 1;
            stats.total_reward += result.reward;
            if result.terminal {
                stats.episodes += 1;
                debug!(episode = stats.episodes, step = stats.steps, "Episode completed");
            }
        }

        self.session.check_health()?;
        info!(
            steps = stats.steps,
            episodes = stats.episodes,
            average_reward = stats.average_reward(),
            "Interaction loop stopped"
        );
        Ok(stats)
    }

    /// Get the environment.
    pub fn environment(&self) -> &E {
        &self.environment
    }

    /// Consume the loop, returning the environment.
    pub fn into_environment(self) -> E {
        self.environment
    }
}
