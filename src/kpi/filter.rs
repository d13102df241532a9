//! KPI key selection by label.
//!
//! A label string is one of:
//! - `"all"`: every key
//! - `"batch"`: the interaction data needed to replay a session
//! - `"analysis"`: reward and training diagnostics
//! - `"default"` or `""`: batch and analysis together
//! - anything else: comma separated regular expressions

use regex::RegexSet;

use crate::core::Result;

/// Keys describing the raw interactions.
pub const BATCH_KPIS: &[&str] = &["^reward$", "^terminal$", "^s0\\..*$", "^actions\\..*$", "^s1\\..*$"];

/// Keys describing the training process: rewards, policy outputs,
/// gradients and the runner's `training.*` statistics.
pub const ANALYSIS_KPIS: &[&str] = &[
    "^reward$",
    "^avgReward$",
    "^delta$",
    "^policy\\..*$",
    "^netGrads\\..*$",
    "^grads\\..*$",
    "^deltaGrads\\..*$",
    "^actionMasks\\..*$",
    "^trainedLayers\\..*$",
    "^trainingLayers\\..*$",
    "^training\\..*$",
];

/// Predicate over KPI keys.
#[derive(Clone, Debug)]
pub struct KpiFilter {
    patterns: Option<RegexSet>,
}

impl KpiFilter {
    /// A filter that accepts every key.
    pub fn all() -> Self {
        Self { patterns: None }
    }

    /// A filter accepting keys that match any of the patterns.
    ///
    /// An empty pattern list accepts every key.
    pub fn from_patterns<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if patterns.is_empty() {
            return Ok(Self::all());
        }
        Ok(Self {
            patterns: Some(RegexSet::new(patterns)?),
        })
    }

    /// Parse a label string (see module docs).
    pub fn from_labels(labels: &str) -> Result<Self> {
        match labels.trim() {
            "all" => Ok(Self::all()),
            "batch" => Self::from_patterns(BATCH_KPIS),
            "analysis" => Self::from_patterns(ANALYSIS_KPIS),
            "default" | "" => Self::from_patterns(default_kpis()),
            custom => Self::from_patterns(custom.split(',')),
        }
    }

    /// Check whether a key is selected.
    pub fn matches(&self, key: &str) -> bool {
        self.patterns.as_ref().map_or(true, |set| set.is_match(key))
    }
}

impl Default for KpiFilter {
    fn default() -> Self {
        Self::all()
    }
}

/// Batch and analysis keys without duplicates.
fn default_kpis() -> Vec<&'static str> {
    let mut keys: Vec<&'static str> = BATCH_KPIS.to_vec();
    for key in ANALYSIS_KPIS {
        if !keys.contains(key) {
            keys.push(*key);
        }
    }
    keys
}
