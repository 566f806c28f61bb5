//! Training and selection configuration parsing from environment variables.
//!
//! Horizons, algorithm families, split sizing and the fetch selection policy.

use super::{parse_or, parse_usize};
use crate::application::ml::algorithms::AlgorithmSettings;
use crate::application::ml::dataset::SplitPolicy;
use crate::application::sync::fetcher::SelectionPolicy;
use crate::domain::ml::Horizon;
use crate::domain::ml::horizon::parse_horizons;
use anyhow::{Context, Result};
use std::env;

pub const DEFAULT_HORIZONS: &str = "24,48,72";
pub const DEFAULT_ALGORITHMS: &str = "linear_regression,ridge_regression,random_forest";

#[derive(Debug, Clone)]
pub struct PipelineEnvConfig {
    pub horizons: Vec<Horizon>,
    pub algorithms: Vec<String>,

    // Split
    pub train_ratio: f64,
    pub min_train_samples: usize,
    pub min_test_samples: usize,

    // Algorithm hyperparameters
    pub rf_n_trees: usize,
    pub rf_max_depth: u16,
    pub ridge_alpha: f64,

    pub training_workers: usize,

    // Fetch selection
    pub selection_policy: SelectionPolicy,
    pub lookback_hours: i64,
}

impl PipelineEnvConfig {
    pub fn from_env() -> Result<Self> {
        let horizons_str = env::var("AQI_HORIZONS").unwrap_or_else(|_| DEFAULT_HORIZONS.to_string());
        let horizons = parse_horizons(&horizons_str).context("Failed to parse AQI_HORIZONS")?;

        let algorithms_str = env::var("AQI_ALGORITHMS").unwrap_or_else(|_| DEFAULT_ALGORITHMS.to_string());
        let algorithms: Vec<String> = algorithms_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if algorithms.is_empty() {
            anyhow::bail!("AQI_ALGORITHMS must name at least one algorithm family");
        }

        let train_ratio = parse_or("AQI_TRAIN_RATIO", 0.7)?;
        if !(train_ratio > 0.0 && train_ratio < 1.0) {
            anyhow::bail!("AQI_TRAIN_RATIO must be in (0, 1), got {}", train_ratio);
        }

        let default_workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        let selection_policy = env::var("AQI_SELECTION_POLICY")
            .unwrap_or_else(|_| "latest".to_string())
            .parse::<SelectionPolicy>()?;

        let lookback_hours = parse_or("AQI_LOOKBACK_HOURS", 24i64)?;
        if lookback_hours <= 0 {
            anyhow::bail!("AQI_LOOKBACK_HOURS must be positive");
        }

        Ok(Self {
            horizons,
            algorithms,
            train_ratio,
            min_train_samples: parse_usize("AQI_MIN_TRAIN_SAMPLES", 5)?,
            min_test_samples: parse_usize("AQI_MIN_TEST_SAMPLES", 2)?,
            rf_n_trees: parse_usize("AQI_RF_N_TREES", 50)?,
            rf_max_depth: parse_or("AQI_RF_MAX_DEPTH", 5u16)?,
            ridge_alpha: parse_or("AQI_RIDGE_ALPHA", 1.0)?,
            training_workers: parse_usize("AQI_TRAINING_WORKERS", default_workers)?.max(1),
            selection_policy,
            lookback_hours,
        })
    }

    pub fn split_policy(&self) -> SplitPolicy {
        SplitPolicy {
            train_ratio: self.train_ratio,
            min_train: self.min_train_samples,
            min_test: self.min_test_samples,
        }
    }

    pub fn algorithm_settings(&self) -> AlgorithmSettings {
        AlgorithmSettings {
            rf_n_trees: self.rf_n_trees,
            rf_max_depth: self.rf_max_depth,
            ridge_alpha: self.ridge_alpha,
        }
    }

    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(self.lookback_hours)
    }
}
