//! Observability configuration parsing from environment variables.
//!
//! Metrics are push-only: rendered into the log after each cycle and,
//! when a path is set, written for a textfile collector.

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ObservabilityEnvConfig {
    pub enabled: bool,
    pub metrics_path: Option<PathBuf>,
}

impl Default for ObservabilityEnvConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            metrics_path: None,
        }
    }
}

impl ObservabilityEnvConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: env::var("OBSERVABILITY_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse::<bool>()
                .unwrap_or(true),
            metrics_path: env::var("AQI_METRICS_PATH")
                .ok()
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        }
    }
}
