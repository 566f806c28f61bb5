//! Configuration module for the AQI forecast pipeline.
//!
//! Structured configuration loaded from environment variables, organized by
//! concern: Pipeline (training + selection), Store, Transport, Freshness and
//! Observability. Missing values fall back to defaults; malformed values are
//! errors.

mod freshness_config;
mod observability_config;
mod pipeline_config;
mod store_config;
mod transport_config;

pub use freshness_config::FreshnessEnvConfig;
pub use observability_config::ObservabilityEnvConfig;
pub use pipeline_config::{DEFAULT_ALGORITHMS, DEFAULT_HORIZONS, PipelineEnvConfig};
pub use store_config::StoreEnvConfig;
pub use transport_config::{TransportEnvConfig, TransportKind};

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    pub pipeline: PipelineEnvConfig,
    pub store: StoreEnvConfig,
    pub transport: TransportEnvConfig,
    pub freshness: FreshnessEnvConfig,
    pub observability: ObservabilityEnvConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            pipeline: PipelineEnvConfig::from_env().context("Failed to load pipeline config")?,
            store: StoreEnvConfig::from_env(),
            transport: TransportEnvConfig::from_env().context("Failed to load transport config")?,
            freshness: FreshnessEnvConfig::from_env().context("Failed to load freshness config")?,
            observability: ObservabilityEnvConfig::from_env(),
        })
    }
}

/// Parse `key` if set, `default` otherwise
pub(crate) fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("Failed to parse {}", key)),
        Err(_) => Ok(default),
    }
}

pub(crate) fn parse_usize(key: &str, default: usize) -> Result<usize> {
    parse_or(key, default)
}

pub(crate) fn parse_u64(key: &str, default: u64) -> Result<u64> {
    parse_or(key, default)
}
