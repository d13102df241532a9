//! KPI records: named tensors produced per interaction or training pass.

use im::OrdMap;
use serde::{Deserialize, Serialize};

use crate::core::{ExecutionResult, Tensor};

/// A named mapping of metric name to tensor.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KpiRecord {
    values: OrdMap<String, Tensor>,
}

impl KpiRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the interaction record for an observed result.
    ///
    /// Keys: `reward`, `terminal`, `s0.<signal>`, `actions.<output>`,
    /// `s1.<signal>`.
    pub fn from_result(result: &ExecutionResult) -> Self {
        let mut record = Self::new()
            .with("reward", Tensor::scalar(result.reward as f32))
            .with("terminal", Tensor::scalar(if result.terminal { 1.0 } else { 0.0 }));
        for (name, value) in result.s0.iter() {
            record.insert(format!("s0.{name}"), value.clone());
        }
        for (name, action) in result.actions.iter() {
            record.insert(format!("actions.{name}"), Tensor::scalar(*action as f32));
        }
        for (name, value) in result.s1.iter() {
            record.insert(format!("s1.{name}"), value.clone());
        }
        record
    }

    /// Add a value, returning the extended record.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Tensor) -> Self {
        self.insert(key, value);
        self
    }

    /// Add a value in place. An existing key is replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: Tensor) {
        self.values.insert(key.into(), value);
    }

    /// Combine two records; keys in `other` win.
    #[must_use]
    pub fn merged(&self, other: &KpiRecord) -> Self {
        Self {
            values: other.values.clone().union(self.values.clone()),
        }
    }

    /// Get a value by key.
    pub fn get(&self, key: &str) -> Option<&Tensor> {
        self.values.get(key)
    }

    /// Get the number of metrics.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the record is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over the metrics in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Tensor)> {
        self.values.iter()
    }

    /// Iterate over the metric names in order.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }
}
