use super::parse_or;
use crate::application::sync::freshness::FreshnessPolicy;
use anyhow::{Context, Result};
use std::env;

/// Readiness gate configuration
#[derive(Debug, Clone)]
pub struct FreshnessEnvConfig {
    pub max_staleness_hours: i64,
    /// Unset means `max(horizons) + 1`
    pub min_consecutive_records: Option<usize>,
}

impl FreshnessEnvConfig {
    pub fn from_env() -> Result<Self> {
        let max_staleness_hours = parse_or("AQI_MAX_STALENESS_HOURS", 25i64)?;
        if max_staleness_hours <= 0 {
            anyhow::bail!("AQI_MAX_STALENESS_HOURS must be positive");
        }

        let min_consecutive_records = match env::var("AQI_MIN_CONSECUTIVE_RECORDS") {
            Ok(v) => Some(
                v.trim()
                    .parse::<usize>()
                    .context("Failed to parse AQI_MIN_CONSECUTIVE_RECORDS")?,
            ),
            Err(_) => None,
        };

        Ok(Self {
            max_staleness_hours,
            min_consecutive_records,
        })
    }

    pub fn policy(&self) -> FreshnessPolicy {
        FreshnessPolicy {
            min_consecutive_records: self.min_consecutive_records,
            max_staleness: chrono::Duration::hours(self.max_staleness_hours),
        }
    }
}
