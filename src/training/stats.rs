//! Training pass statistics for logging and KPIs.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::Tensor;
use crate::kpi::KpiRecord;

/// Statistics of one training pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingStats {
    /// Task that produced these statistics.
    pub task_id: u64,

    /// Steps passed to the agent (the clipped window).
    pub trained_steps: usize,

    /// Steps collected since the previous pass.
    /// May exceed `trained_steps` when the trajectory was clipped.
    pub collected_steps: usize,

    /// Time spent in the agent's update (microseconds).
    pub elapsed_us: u64,

    /// Whether the pass wrote a checkpoint.
    pub saved: bool,
}

impl TrainingStats {
    /// Wall-clock duration of the update.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.elapsed_us)
    }

    /// Steps collected but never trained on.
    #[must_use]
    pub fn discarded_steps(&self) -> usize {
        self.collected_steps.saturating_sub(self.trained_steps)
    }

    /// Calculate trained steps per second.
    #[must_use]
    pub fn steps_per_second(&self) -> f64 {
        if self.elapsed_us == 0 {
            0.0
        } else {
            self.trained_steps as f64 / (self.elapsed_us as f64 / 1_000_000.0)
        }
    }

    /// Render as a KPI record under the `training.` prefix.
    pub fn to_kpis(&self) -> KpiRecord {
        KpiRecord::new()
            .with("training.trainedSteps", Tensor::scalar(self.trained_steps as f32))
            .with("training.collectedSteps", Tensor::scalar(self.collected_steps as f32))
            .with("training.elapsedMs", Tensor::scalar(self.elapsed_us as f32 / 1000.0))
            .with("training.saved", Tensor::scalar(if self.saved { 1.0 } else { 0.0 }))
    }
}
