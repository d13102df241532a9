//! Training coordinator: an immutable state snapshot plus transitions.
//!
//! Every operation takes the current [`CoordinatorState`] and returns the
//! next one. The host applies transitions one at a time (the
//! [`Session`](crate::session::Session) does so under a mutex) while the
//! training pass itself runs elsewhere on a snapshot it owns exclusively.
//!
//! ## Lifecycle of a pass
//!
//! 1. `observe_result` folds a result into the agent. When the agent is
//!    ready and no pass is in flight, the trajectory is clipped to the
//!    agent's `num_steps` most recent entries, the live agent gets an empty
//!    trajectory, and a [`TrainingJob`] is produced.
//! 2. The job runs (on the caller in synchronous mode, on the runner
//!    otherwise) and yields a [`TrainedOutcome`].
//! 3. `on_training_task_complete` merges the trained parameters with the
//!    live hyper-parameters and the experience collected meanwhile, unless
//!    the agent was reset after launch.
//!
//! A failed synchronous pass halts the coordinator: the agent keeps
//! observing but no pass is launched again, matching a background pass
//! whose failure leaves it pending forever.
//!
//! Resets are reconciled with a generation counter: every reset bumps the
//! generation and a result is merged only if it was launched in the
//! current generation. Any number of resets per pass is handled.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::checkpoint::CheckpointScheduler;
use super::stats::TrainingStats;
use crate::core::{Agent, Alphas, ExecutionResult, Result, TrainerConfig, Trajectory};

/// Handle of the training pass in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingTraining {
    /// Identifier of the launched task.
    pub task_id: u64,
    /// Generation the task was launched in.
    pub generation: u64,
    /// Launch instant, for the watchdog.
    pub launched_at: Instant,
}

/// One training pass, ready to run on any thread.
#[derive(Clone, Debug)]
pub struct TrainingJob<A> {
    task_id: u64,
    generation: u64,
    agent: A,
    window: Trajectory,
    collected: usize,
    checkpoint: CheckpointScheduler,
}

impl<A: Agent> TrainingJob<A> {
    /// Identifier of the task.
    pub fn task_id(&self) -> u64 {
        self.task_id
    }

    /// Generation the task was launched in.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The cleared agent snapshot being trained.
    pub fn agent(&self) -> &A {
        &self.agent
    }

    /// The clipped trajectory window.
    pub fn window(&self) -> &Trajectory {
        &self.window
    }

    /// Number of steps collected before clipping.
    pub fn collected(&self) -> usize {
        self.collected
    }

    /// Run the training pass and, when due, checkpoint the trained agent.
    ///
    /// Errors from the agent's update or from `save` are returned as is.
    pub fn run(self) -> Result<TrainedOutcome<A>> {
        debug!(task_id = self.task_id, "Training ...");
        let started = Instant::now();
        let trained = self.agent.train_by_trajectory(&self.window)?;
        let now = Instant::now();
        let elapsed = now.duration_since(started);
        info!(
            task_id = self.task_id,
            trained_steps = self.window.len(),
            collected_steps = self.collected,
            elapsed_ms = elapsed.as_millis() as u64,
            "Trained {}/{} steps in {} ms",
            self.window.len(),
            self.collected,
            elapsed.as_millis()
        );

        let (checkpoint, saved) = if self.checkpoint.is_due(now) {
            trained.save()?;
            info!(task_id = self.task_id, "Agent checkpoint saved");
            (self.checkpoint.rescheduled(now), true)
        } else {
            (self.checkpoint, false)
        };

        Ok(TrainedOutcome {
            task_id: self.task_id,
            generation: self.generation,
            agent: trained,
            checkpoint,
            stats: TrainingStats {
                task_id: self.task_id,
                trained_steps: self.window.len(),
                collected_steps: self.collected,
                elapsed_us: elapsed.as_micros() as u64,
                saved,
            },
        })
    }
}

/// Result of a completed training pass.
#[derive(Clone, Debug)]
pub struct TrainedOutcome<A> {
    /// Task that produced the outcome.
    pub task_id: u64,
    /// Generation the task was launched in.
    pub generation: u64,
    /// The trained agent.
    pub agent: A,
    /// Checkpoint schedule after the pass.
    pub checkpoint: CheckpointScheduler,
    /// Pass statistics.
    pub stats: TrainingStats,
}

/// Result of `observe_result`.
#[derive(Debug)]
pub struct Transition<A> {
    /// The next coordinator state.
    pub state: CoordinatorState<A>,
    /// A pass the host must launch in the background.
    pub job: Option<TrainingJob<A>>,
    /// Statistics of a pass already run on the calling thread.
    pub completed: Option<TrainingStats>,
}

/// Immutable snapshot of the online training process.
#[derive(Clone, Debug)]
pub struct CoordinatorState<A> {
    agent: A,
    pending: Option<PendingTraining>,
    generation: u64,
    next_task_id: u64,
    synchronous: bool,
    halted: bool,
    checkpoint: CheckpointScheduler,
}

impl<A: Agent> CoordinatorState<A> {
    /// Initial state for an agent.
    pub fn new(agent: A, synchronous: bool, checkpoint: CheckpointScheduler) -> Self {
        Self {
            agent,
            pending: None,
            generation: 0,
            next_task_id: 0,
            synchronous,
            halted: false,
            checkpoint,
        }
    }

    /// Initial state from a configuration; first checkpoint one
    /// `save_interval` from now.
    pub fn from_config(agent: A, config: &TrainerConfig) -> Self {
        Self::new(
            agent,
            config.synchronous_training,
            CheckpointScheduler::new(config.save_interval),
        )
    }

    /// The live agent.
    pub fn agent(&self) -> &A {
        &self.agent
    }

    /// True while a background pass is in flight.
    pub fn is_training(&self) -> bool {
        self.pending.is_some()
    }

    /// The pass in flight, if any.
    pub fn pending(&self) -> Option<&PendingTraining> {
        self.pending.as_ref()
    }

    /// True if the result of the pass in flight will be discarded.
    pub fn skip_next_trained_agent(&self) -> bool {
        self.pending
            .map_or(false, |pending| pending.generation != self.generation)
    }

    /// Number of resets so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True if passes run on the calling thread.
    pub fn is_synchronous(&self) -> bool {
        self.synchronous
    }

    /// True once training has been halted by a failure.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Current checkpoint schedule.
    pub fn checkpoint(&self) -> &CheckpointScheduler {
        &self.checkpoint
    }

    /// Instant after which the next pass writes a checkpoint.
    pub fn next_save_deadline(&self) -> Instant {
        self.checkpoint.next_save()
    }

    /// Minimum time between checkpoints.
    pub fn save_interval(&self) -> Duration {
        self.checkpoint.interval()
    }

    /// Replace the live agent.
    #[must_use]
    pub fn with_agent(&self, agent: A) -> Self {
        Self {
            agent,
            ..self.clone()
        }
    }

    /// Stop launching passes. Survives resets.
    #[must_use]
    pub fn halted(&self) -> Self {
        Self {
            halted: true,
            ..self.clone()
        }
    }

    /// Edit the live agent's alphas.
    #[must_use]
    pub fn with_alphas(&self, alphas: Alphas) -> Self {
        self.with_agent(self.agent.with_alphas(alphas))
    }

    /// Edit the live agent's learning rate.
    #[must_use]
    pub fn with_eta(&self, eta: f32) -> Self {
        self.with_agent(self.agent.with_eta(eta))
    }

    /// Fold a result into the agent and launch a pass if it is ready.
    ///
    /// A pass in flight is never preempted: readiness is checked again on
    /// the next call after it completes. In synchronous mode the pass runs
    /// here and its failure is returned.
    pub fn observe_result(&self, result: ExecutionResult) -> Result<Transition<A>> {
        let observed = self.agent.observe(result);
        if self.halted || !observed.is_ready_for_train() || self.is_training() {
            return Ok(Transition {
                state: self.with_agent(observed),
                job: None,
                completed: None,
            });
        }

        let trajectory = observed.trajectory();
        let job = TrainingJob {
            task_id: self.next_task_id,
            generation: self.generation,
            agent: observed.with_trajectory(Trajectory::new()),
            window: trajectory.clipped(observed.num_steps()),
            collected: trajectory.len(),
            checkpoint: self.checkpoint,
        };

        if self.synchronous {
            let outcome = job.run()?;
            let state = Self {
                agent: outcome.agent,
                next_task_id: self.next_task_id + 1,
                checkpoint: outcome.checkpoint,
                ..self.clone()
            };
            return Ok(Transition {
                state,
                job: None,
                completed: Some(outcome.stats),
            });
        }

        // Acting continues on the cleared snapshot, which also carries
        // any hyper-parameters edited since the last pass.
        let state = Self {
            agent: job.agent.clone(),
            pending: Some(PendingTraining {
                task_id: job.task_id,
                generation: job.generation,
                launched_at: Instant::now(),
            }),
            next_task_id: self.next_task_id + 1,
            ..self.clone()
        };
        debug!(
            task_id = job.task_id,
            window = job.window.len(),
            collected = job.collected,
            "Launching background training"
        );
        Ok(Transition {
            state,
            job: Some(job),
            completed: None,
        })
    }

    /// Reconcile a completed background pass with the live state.
    pub fn on_training_task_complete(&self, outcome: TrainedOutcome<A>) -> Self {
        let Some(pending) = self.pending else {
            warn!(task_id = outcome.task_id, "Training result without pending task ignored");
            return self.clone();
        };
        if pending.task_id != outcome.task_id {
            warn!(
                task_id = outcome.task_id,
                pending_task_id = pending.task_id,
                "Training result for unknown task ignored"
            );
            return self.clone();
        }

        if outcome.generation != self.generation {
            debug!(task_id = outcome.task_id, "Agent reset during training, trained agent discarded");
            return Self {
                pending: None,
                ..self.clone()
            };
        }

        let merged = outcome
            .agent
            .with_eta(self.agent.eta())
            .with_alphas(self.agent.alphas().clone())
            .with_trajectory(self.agent.trajectory().clone());
        Self {
            agent: merged,
            pending: None,
            checkpoint: outcome.checkpoint,
            ..self.clone()
        }
    }

    /// Reset the agent; any pass in flight will be discarded.
    #[must_use]
    pub fn reset_agent(&self) -> Self {
        if self.is_training() {
            debug!("Agent reset while training, next trained agent will be skipped");
        }
        Self {
            agent: self.agent.init(),
            generation: self.generation + 1,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Actions, Signals, TrainerError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Clone, Debug)]
    struct StubAgent {
        trajectory: Trajectory,
        num_steps: usize,
        ready_at: usize,
        eta: f32,
        alphas: Alphas,
        passes: u32,
        window: Vec<f64>,
        resets: u32,
        saves: Arc<AtomicUsize>,
        fail: bool,
    }

    impl StubAgent {
        fn new(num_steps: usize, ready_at: usize) -> Self {
            Self {
                trajectory: Trajectory::new(),
                num_steps,
                ready_at,
                eta: 0.1,
                alphas: Alphas::unit("critic".to_string(), 1.0),
                passes: 0,
                window: Vec::new(),
                resets: 0,
                saves: Arc::new(AtomicUsize::new(0)),
                fail: false,
            }
        }
    }

    impl Agent for StubAgent {
        fn act(&self, _state: &Signals) -> Actions {
            Actions::new()
        }

        fn observe(&self, result: ExecutionResult) -> Self {
            self.with_trajectory(self.trajectory.pushed(result))
        }

        fn train_by_trajectory(&self, trajectory: &Trajectory) -> Result<Self> {
            if self.fail {
                return Err(TrainerError::Training("update failed".to_string()));
            }
            Ok(Self {
                passes: self.passes + 1,
                window: trajectory.iter().map(|r| r.reward).collect(),
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
            self.trajectory.len() >= self.ready_at
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
                trajectory: Trajectory::new(),
                passes: 0,
                window: Vec::new(),
                resets: self.resets + 1,
                ..self.clone()
            }
        }

        fn save(&self) -> Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn step(reward: f64) -> ExecutionResult {
        ExecutionResult::new(Signals::new(), Actions::new(), reward, Signals::new())
    }

    fn state(agent: StubAgent, synchronous: bool) -> CoordinatorState<StubAgent> {
        CoordinatorState::new(
            agent,
            synchronous,
            CheckpointScheduler::new(Duration::from_secs(3600)),
        )
    }

    /// Observe rewards 1..=n, returning the last transition.
    fn observe_n(
        mut current: CoordinatorState<StubAgent>,
        from: usize,
        to: usize,
    ) -> (CoordinatorState<StubAgent>, Option<TrainingJob<StubAgent>>) {
        let mut launched = None;
        for i in from..=to {
            let transition = current.observe_result(step(i as f64)).unwrap();
            if transition.job.is_some() {
                assert!(launched.is_none(), "two passes launched");
                launched = transition.job;
            }
            current = transition.state;
        }
        (current, launched)
    }

    #[test]
    fn test_not_ready_accumulates() {
        let (s, job) = observe_n(state(StubAgent::new(10, 10), false), 1, 5);

        assert!(job.is_none());
        assert!(!s.is_training());
        assert_eq!(s.agent().trajectory().len(), 5);
    }

    #[test]
    fn test_launch_clips_window() {
        let (s, job) = observe_n(state(StubAgent::new(100, 130), false), 1, 130);
        let job = job.expect("pass launched");

        let window: Vec<f64> = job.window().iter().map(|r| r.reward).collect();
        assert_eq!(window, (31..=130).map(|i| i as f64).collect::<Vec<_>>());
        assert_eq!(job.collected(), 130);
        assert!(job.agent().trajectory().is_empty());

        assert!(s.is_training());
        assert!(s.agent().trajectory().is_empty());
        assert_eq!(s.pending().map(|p| p.task_id), Some(0));
    }

    #[test]
    fn test_no_second_pass_while_training() {
        let (s, job) = observe_n(state(StubAgent::new(2, 2), false), 1, 2);
        assert!(job.is_some());

        // Ready again, but a pass is in flight.
        let (s, job) = observe_n(s, 3, 10);
        assert!(job.is_none());
        assert!(s.is_training());
        assert_eq!(s.agent().trajectory().len(), 8);
    }

    #[test]
    fn test_completion_merges_live_state() {
        let (s, job) = observe_n(state(StubAgent::new(100, 130), false), 1, 130);
        let outcome = job.unwrap().run().unwrap();

        // Operator edits and new experience while training.
        let s = s
            .with_eta(0.5)
            .with_alphas(Alphas::unit("critic".to_string(), 2.0));
        let (s, _) = observe_n(s, 131, 135);

        let merged = s.on_training_task_complete(outcome);

        assert!(!merged.is_training());
        assert_eq!(merged.agent().passes, 1);
        assert_eq!(merged.agent().window.len(), 100);
        assert_eq!(merged.agent().eta(), 0.5);
        assert_eq!(merged.agent().alphas().get("critic"), Some(&2.0));
        let kept: Vec<f64> = merged.agent().trajectory().iter().map(|r| r.reward).collect();
        assert_eq!(kept, vec![131.0, 132.0, 133.0, 134.0, 135.0]);
    }

    #[test]
    fn test_reset_during_training_wins() {
        let (s, job) = observe_n(state(StubAgent::new(4, 4), false), 1, 4);
        let outcome = job.unwrap().run().unwrap();

        let s = s.reset_agent();
        assert!(s.is_training());
        assert!(s.skip_next_trained_agent());

        let s = s.on_training_task_complete(outcome);

        assert!(!s.is_training());
        assert!(!s.skip_next_trained_agent());
        assert_eq!(s.agent().passes, 0);
        assert_eq!(s.agent().resets, 1);
    }

    #[test]
    fn test_two_resets_during_one_pass() {
        let (s, job) = observe_n(state(StubAgent::new(4, 4), false), 1, 4);
        let outcome = job.unwrap().run().unwrap();

        let s = s.reset_agent().reset_agent();
        let s = s.on_training_task_complete(outcome);

        assert!(!s.is_training());
        assert_eq!(s.agent().passes, 0);
        assert_eq!(s.agent().resets, 2);
    }

    #[test]
    fn test_reset_while_idle() {
        let (s, _) = observe_n(state(StubAgent::new(10, 10), false), 1, 3);
        let s = s.reset_agent();

        assert!(!s.is_training());
        assert!(!s.skip_next_trained_agent());
        assert!(s.agent().trajectory().is_empty());
    }

    #[test]
    fn test_completion_without_pending_ignored() {
        let (s, job) = observe_n(state(StubAgent::new(2, 2), false), 1, 2);
        let outcome = job.unwrap().run().unwrap();
        let s = s.on_training_task_complete(outcome.clone());

        // Delivered twice: the second is ignored.
        let again = s.on_training_task_complete(outcome);
        assert!(!again.is_training());
        assert_eq!(again.agent().passes, 1);
    }

    #[test]
    fn test_unknown_task_ignored() {
        let (s, job) = observe_n(state(StubAgent::new(2, 2), false), 1, 2);
        let mut outcome = job.unwrap().run().unwrap();
        outcome.task_id = 99;

        let s = s.on_training_task_complete(outcome);
        assert!(s.is_training());
    }

    #[test]
    fn test_synchronous_training() {
        let (s, _) = observe_n(state(StubAgent::new(3, 3), true), 1, 2);
        let transition = s.observe_result(step(3.0)).unwrap();

        assert!(transition.job.is_none());
        let stats = transition.completed.expect("pass ran");
        assert_eq!(stats.trained_steps, 3);
        assert!(!transition.state.is_training());
        assert_eq!(transition.state.agent().passes, 1);
        assert!(transition.state.agent().trajectory().is_empty());
    }

    #[test]
    fn test_synchronous_failure_propagates() {
        let mut agent = StubAgent::new(1, 1);
        agent.fail = true;
        let s = state(agent, true);

        let result = s.observe_result(step(1.0));
        assert!(matches!(result, Err(TrainerError::Training(_))));
    }

    #[test]
    fn test_halted_never_launches() {
        let s = state(StubAgent::new(2, 2), false).halted();

        let (s, job) = observe_n(s, 1, 10);
        assert!(job.is_none());
        assert!(!s.is_training());
        assert_eq!(s.agent().trajectory().len(), 10);

        let s = s.reset_agent();
        assert!(s.is_halted());
        let (_, job) = observe_n(s, 1, 4);
        assert!(job.is_none());
    }

    #[test]
    fn test_checkpoint_when_due() {
        let agent = StubAgent::new(2, 2);
        let saves = Arc::clone(&agent.saves);
        let s = CoordinatorState::new(agent, false, CheckpointScheduler::new(Duration::ZERO));
        let deadline = s.next_save_deadline();

        let (s, job) = observe_n(s, 1, 2);
        let outcome = job.unwrap().run().unwrap();

        assert!(outcome.stats.saved);
        assert_eq!(saves.load(Ordering::SeqCst), 1);

        let s = s.on_training_task_complete(outcome);
        assert!(s.next_save_deadline() >= deadline);
    }

    #[test]
    fn test_no_checkpoint_before_interval() {
        let agent = StubAgent::new(2, 2);
        let saves = Arc::clone(&agent.saves);
        let (_, job) = observe_n(state(agent, false), 1, 2);

        let outcome = job.unwrap().run().unwrap();

        assert!(!outcome.stats.saved);
        assert_eq!(saves.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_discarded_result_keeps_deadline() {
        let s = CoordinatorState::new(
            StubAgent::new(2, 2),
            false,
            CheckpointScheduler::new(Duration::ZERO),
        );
        let deadline = s.next_save_deadline();
        let (s, job) = observe_n(s, 1, 2);
        let outcome = job.unwrap().run().unwrap();

        let s = s.reset_agent().on_training_task_complete(outcome);
        assert_eq!(s.next_save_deadline(), deadline);
    }
}
