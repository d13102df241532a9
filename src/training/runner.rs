//! Background training runner.
//!
//! A single `training-runner` thread executes [`TrainingJob`]s in
//! submission order and hands every outcome, success or failure, to a
//! completion callback. A panicking pass is caught and reported as
//! [`TrainerError::TrainingPanicked`] so the runner keeps serving.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Sender};
use tracing::{debug, error, info, warn};

use super::coordinator::{TrainedOutcome, TrainingJob};
use crate::core::{Agent, Result, TrainerError};
use crate::kpi::CompletionGate;

/// Completion notice for one job.
#[derive(Debug)]
pub struct TaskReport<A> {
    /// Task the report belongs to.
    pub task_id: u64,
    /// Generation the task was launched in.
    pub generation: u64,
    /// Trained outcome, or why the pass failed.
    pub result: Result<TrainedOutcome<A>>,
}

/// Signals the gate when the runner thread unwinds or returns.
struct ExitGuard(CompletionGate);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.signal();
    }
}

/// Handle owning the runner thread.
pub struct TrainingRunner<A> {
    jobs: Option<Sender<TrainingJob<A>>>,
    busy: Arc<AtomicBool>,
    exited: CompletionGate,
    handle: Option<JoinHandle<()>>,
}

impl<A: Agent> TrainingRunner<A> {
    /// Start the runner thread.
    pub fn spawn<F>(mut on_complete: F) -> Result<Self>
    where
        F: FnMut(TaskReport<A>) + Send + 'static,
    {
        let (jobs, queue) = unbounded::<TrainingJob<A>>();
        let busy = Arc::new(AtomicBool::new(false));
        let exited = CompletionGate::new();

        let thread_busy = Arc::clone(&busy);
        let guard = ExitGuard(exited.clone());
        let handle = thread::Builder::new()
            .name("training-runner".to_string())
            .spawn(move || {
                let _guard = guard;
                for job in queue.iter() {
                    thread_busy.store(true, Ordering::Release);
                    let report = execute(job);
                    thread_busy.store(false, Ordering::Release);
                    on_complete(report);
                }
                debug!("Training runner stopped");
            })
            .map_err(|source| TrainerError::Spawn {
                name: "training-runner",
                source,
            })?;

        Ok(Self {
            jobs: Some(jobs),
            busy,
            exited,
            handle: Some(handle),
        })
    }

    /// Queue a job. Fails once the runner is shut down.
    pub fn submit(&self, job: TrainingJob<A>) -> Result<()> {
        let jobs = self.jobs.as_ref().ok_or(TrainerError::SessionClosed)?;
        jobs.send(job).map_err(|_| TrainerError::SessionClosed)
    }

    /// True while a pass is executing.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// True once the runner thread has exited.
    pub fn is_stopped(&self) -> bool {
        self.exited.is_signaled()
    }

    /// Stop accepting jobs and wait for the queued ones to finish.
    ///
    /// Returns false if the thread was still running when `timeout`
    /// elapsed; it is then detached and its late completions are ignored
    /// by whoever owns the callback.
    pub fn shutdown(&mut self, timeout: Option<Duration>) -> bool {
        self.jobs.take();
        if !self.exited.wait_for(timeout) {
            warn!(?timeout, "Training runner still busy, detaching");
            self.handle.take();
            return false;
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Training runner thread panicked");
            }
        }
        info!("Training runner shut down");
        true
    }
}

impl<A> Drop for TrainingRunner<A> {
    fn drop(&mut self) {
        // Disconnect; the thread exits after its current job.
        self.jobs.take();
    }
}

impl<A> std::fmt::Debug for TrainingRunner<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainingRunner")
            .field("busy", &self.busy.load(Ordering::Relaxed))
            .field("stopped", &self.exited.is_signaled())
            .finish()
    }
}

fn execute<A: Agent>(job: TrainingJob<A>) -> TaskReport<A> {
    let task_id = job.task_id();
    let generation = job.generation();
    let result = catch_unwind(AssertUnwindSafe(move || job.run())).unwrap_or_else(|payload| {
        Err(TrainerError::TrainingPanicked {
            task_id,
            message: panic_message(payload.as_ref()),
        })
    });
    if let Err(e) = &result {
        error!(task_id, error = %e, "Training pass failed");
    }
    TaskReport {
        task_id,
        generation,
        result,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
