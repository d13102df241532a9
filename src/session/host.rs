//! Host-facing session: the single point of serialization.
//!
//! A [`Session`] owns the coordinator state behind a mutex, the training
//! runner, and the KPI sink with its completion gate. Every host operation
//! and every runner completion is one transition applied under that lock,
//! so the coordinator never observes interleaved updates.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::core::{
    Actions, Agent, Alphas, ExecutionResult, Result, Signals, TrainerConfig, TrainerError,
};
use crate::kpi::{BinKpiWriter, CompletionGate, KpiRecord, KpiSink, KpiWriter, SinkStats};
use crate::training::{CoordinatorState, TaskReport, TrainingRunner, TrainingStats};

/// Outcome of [`Session::shutdown_and_drain`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// True if a bounded wait expired and pending work was abandoned.
    pub forced: bool,
    /// Final sink statistics, if KPIs were enabled.
    pub kpi: Option<SinkStats>,
    /// True if a training pass was still pending when shutdown returned.
    pub training_in_flight: bool,
}

/// State shared with the runner's completion callback.
struct Shared<A> {
    state: Mutex<CoordinatorState<A>>,
    /// Notified whenever a pass stops being pending.
    idle: Condvar,
    kpis: Option<KpiSink>,
    fault: Mutex<Option<String>>,
    closing: AtomicBool,
}

impl<A: Agent> Shared<A> {
    fn emit(&self, record: KpiRecord) {
        if let Some(sink) = &self.kpis {
            sink.write(record);
        }
    }

    fn emit_training(&self, stats: &TrainingStats, agent: Option<&A>) {
        if self.kpis.is_none() {
            return;
        }
        let record = stats.to_kpis();
        let record = match agent {
            Some(agent) => record.merged(&agent.kpis()),
            None => record,
        };
        self.emit(record);
    }

    fn record_fault(&self, error: &TrainerError) {
        let mut fault = self.fault.lock();
        if fault.is_none() {
            *fault = Some(error.to_string());
        }
    }

    fn on_report(&self, report: TaskReport<A>) {
        let outcome = match report.result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(task_id = report.task_id, error = %e, "Training halted");
                self.record_fault(&e);
                return;
            }
        };

        let stats = outcome.stats.clone();
        let mut state = self.state.lock();
        let merged = state
            .pending()
            .map_or(false, |p| p.task_id == report.task_id && p.generation == state.generation());
        *state = state.on_training_task_complete(outcome);
        // Queued before the lock is released, so an idle session has
        // already emitted every pass it completed.
        let agent = if merged { Some(state.agent()) } else { None };
        self.emit_training(&stats, agent);
        if !state.is_training() {
            self.idle.notify_all();
        }
    }
}

/// Online training session around one agent.
pub struct Session<A: Agent> {
    shared: Arc<Shared<A>>,
    runner: Mutex<Option<TrainingRunner<A>>>,
    gate: CompletionGate,
    config: TrainerConfig,
}

impl<A: Agent> Session<A> {
    /// Start a session with the given configuration.
    ///
    /// KPIs are persisted under `config.kpi_path` when set.
    pub fn new(agent: A, config: TrainerConfig) -> Result<Self> {
        SessionBuilder::new(agent).config(config).build()
    }

    /// Start configuring a session.
    pub fn builder(agent: A) -> SessionBuilder<A> {
        SessionBuilder::new(agent)
    }

    /// Fold an interaction into the agent, launching training when ready.
    ///
    /// Training failures never surface here; see [`Session::check_health`].
    pub fn observe_result(&self, result: ExecutionResult) -> Result<()> {
        if self.shared.closing.load(Ordering::Acquire) {
            return Err(TrainerError::SessionClosed);
        }
        self.shared.emit(KpiRecord::from_result(&result));

        let mut state = self.shared.state.lock();
        let transition = match state.observe_result(result.clone()) {
            Ok(transition) => transition,
            Err(e) => {
                // Only synchronous passes fail here. No pass is retried.
                error!(error = %e, "Synchronous training failed, training halted");
                self.shared.record_fault(&e);
                let observed = state.agent().observe(result);
                *state = state.with_agent(observed).halted();
                return Ok(());
            }
        };
        *state = transition.state;

        if let Some(stats) = transition.completed {
            self.shared.emit_training(&stats, Some(state.agent()));
            return Ok(());
        }

        let Some(job) = transition.job else {
            return Ok(());
        };
        drop(state);
        let task_id = job.task_id();
        let submitted = match self.runner.lock().as_ref() {
            Some(runner) => runner.submit(job),
            None => Err(TrainerError::SessionClosed),
        };
        if let Err(e) = submitted {
            warn!(task_id, error = %e, "Training pass not launched");
            self.shared.record_fault(&e);
            return Err(e);
        }
        Ok(())
    }

    /// Choose actions with the live agent.
    pub fn act(&self, state: &Signals) -> Actions {
        self.current_agent().act(state)
    }

    /// Reset the agent. A pass in flight is discarded on completion.
    pub fn reset_agent(&self) {
        let mut state = self.shared.state.lock();
        *state = state.reset_agent();
        info!(generation = state.generation(), "Agent reset");
    }

    /// Snapshot of the live agent.
    pub fn current_agent(&self) -> A {
        self.shared.state.lock().agent().clone()
    }

    /// Snapshot of the whole coordinator state.
    pub fn snapshot(&self) -> CoordinatorState<A> {
        self.shared.state.lock().clone()
    }

    /// Change the live agent's alphas.
    pub fn set_alphas(&self, alphas: Alphas) {
        let mut state = self.shared.state.lock();
        *state = state.with_alphas(alphas);
    }

    /// Change the live agent's learning rate.
    pub fn set_eta(&self, eta: f32) {
        let mut state = self.shared.state.lock();
        *state = state.with_eta(eta);
        debug!(eta, "Learning rate changed");
    }

    /// True while a background pass is in flight.
    pub fn is_training(&self) -> bool {
        self.shared.state.lock().is_training()
    }

    /// Block until no training pass is pending, or the timeout elapses.
    ///
    /// Returns true if the session went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while state.is_training() {
            if self.shared.idle.wait_until(&mut state, deadline).timed_out() {
                return !state.is_training();
            }
        }
        true
    }

    /// Check for a failed or stalled training pass.
    pub fn check_health(&self) -> Result<()> {
        if let Some(fault) = self.shared.fault.lock().clone() {
            return Err(TrainerError::TrainingHalted(fault));
        }
        let Some(limit) = self.config.training_timeout else {
            return Ok(());
        };
        let state = self.shared.state.lock();
        if let Some(pending) = state.pending() {
            let elapsed = pending.launched_at.elapsed();
            if elapsed > limit {
                return Err(TrainerError::TrainingStalled {
                    task_id: pending.task_id,
                    elapsed,
                    limit,
                });
            }
        }
        Ok(())
    }

    /// Current KPI sink statistics, if KPIs are enabled.
    pub fn kpi_stats(&self) -> Option<SinkStats> {
        self.shared.kpis.as_ref().map(KpiSink::stats)
    }

    /// Gate signaled once the KPI writer has drained and closed.
    pub fn kpi_gate(&self) -> &CompletionGate {
        &self.gate
    }

    /// Configuration the session runs with.
    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Stop the session.
    ///
    /// Refuses further interactions, lets a pass in flight finish and
    /// merge, closes the resulting agent, then drains the KPI sink. Both
    /// waits are bounded by `drain_timeout` when configured; on expiry the
    /// remaining work is abandoned and the report is marked `forced`.
    pub fn shutdown_and_drain(&self) -> ShutdownReport {
        let already_closing = self.shared.closing.swap(true, Ordering::AcqRel);
        if !already_closing {
            info!("Shutting down session");
        }

        let timeout = self.config.drain_timeout;
        let mut forced = false;

        // The runner's last report still lands in the open sink.
        let runner = self.runner.lock().take();
        if let Some(mut runner) = runner {
            if !runner.shutdown(timeout) {
                forced = true;
            }
        }

        if !already_closing {
            if let Err(e) = self.current_agent().close() {
                warn!(error = %e, "Error closing agent");
            }
            if let Some(sink) = &self.shared.kpis {
                sink.close();
            }
        }

        if !self.gate.wait_for(timeout) {
            warn!(?timeout, "KPI drain timed out, discarding queued records");
            if let Some(sink) = &self.shared.kpis {
                sink.abort();
            }
            forced = true;
        }

        let report = ShutdownReport {
            forced,
            kpi: self.kpi_stats(),
            training_in_flight: self.is_training(),
        };
        info!(
            forced = report.forced,
            training_in_flight = report.training_in_flight,
            "Session shut down"
        );
        report
    }
}

impl<A: Agent> std::fmt::Debug for Session<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("closing", &self.shared.closing.load(Ordering::Relaxed))
            .field("kpis", &self.shared.kpis)
            .finish()
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder<A> {
    agent: A,
    config: TrainerConfig,
    writer: Option<Box<dyn KpiWriter>>,
}

impl<A: Agent> SessionBuilder<A> {
    /// Builder with the default configuration.
    pub fn new(agent: A) -> Self {
        Self {
            agent,
            config: TrainerConfig::default(),
            writer: None,
        }
    }

    /// Replace the configuration.
    pub fn config(mut self, config: TrainerConfig) -> Self {
        self.config = config;
        self
    }

    /// Persist KPIs through a custom writer instead of `kpi_path`.
    pub fn kpi_writer<W: KpiWriter>(mut self, writer: W) -> Self {
        self.writer = Some(Box::new(writer));
        self
    }

    /// Persist KPIs as bincode files under `dir`.
    pub fn kpi_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.kpi_path = Some(dir.into());
        self
    }

    /// Validate the configuration and start the worker threads.
    pub fn build(self) -> Result<Session<A>> {
        let Self {
            agent,
            config,
            writer,
        } = self;
        config.validate()?;

        let writer = match (writer, &config.kpi_path) {
            (Some(writer), _) => Some(writer),
            (None, Some(dir)) => Some(
                Box::new(BinKpiWriter::from_labels(dir.clone(), &config.kpi_labels)?)
                    as Box<dyn KpiWriter>,
            ),
            (None, None) => None,
        };
        let (kpis, gate) = match writer {
            Some(writer) => {
                let (sink, gate) = KpiSink::spawn(config.kpi_buffer_capacity, writer)?;
                (Some(sink), gate)
            }
            None => (None, CompletionGate::signaled()),
        };

        let shared = Arc::new(Shared {
            state: Mutex::new(CoordinatorState::from_config(agent, &config)),
            idle: Condvar::new(),
            kpis,
            fault: Mutex::new(None),
            closing: AtomicBool::new(false),
        });

        let runner = if config.synchronous_training {
            None
        } else {
            let callback = Arc::clone(&shared);
            Some(TrainingRunner::spawn(move |report| callback.on_report(report))?)
        };

        info!(
            synchronous = config.synchronous_training,
            save_interval_s = config.save_interval.as_secs(),
            kpis = shared.kpis.is_some(),
            "Session started"
        );
        Ok(Session {
            shared,
            runner: Mutex::new(runner),
            gate,
            config,
        })
    }
}
