use super::horizon::Horizon;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of an algorithm family (`random_forest`, `linear_regression`, ...)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlgorithmTag(pub String);

impl AlgorithmTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlgorithmTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialized trained model. `payload` is whatever the algorithm family
/// wrote; only the same family can read it back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub algorithm: AlgorithmTag,
    pub payload: String,
}

/// Holdout metrics of a candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub mae: f64,
    pub rmse: f64,
    /// Can be negative on small or noisy holdouts
    pub r2: f64,
    /// Percentage. `None` when every holdout actual was zero.
    pub mape: Option<f64>,
    /// Holdout points left out of MAPE because their actual value was zero
    pub mape_excluded: usize,
    pub n_test: usize,
}

/// Time span and sample counts the candidate was trained and scored on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub n_train: usize,
    pub n_test: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelCandidate {
    pub horizon: Horizon,
    pub algorithm: AlgorithmTag,
    pub artifact: ModelArtifact,
    pub metrics: EvaluationMetrics,
    pub window: TrainingWindow,
    pub trained_at: DateTime<Utc>,
}
