//! Artifact transport configuration parsing from environment variables.

use super::{parse_or, parse_u64};
use crate::application::sync::fetcher::RetryPolicy;
use crate::infrastructure::core::http_client_factory::HttpClientSettings;
use anyhow::Result;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Where artifact bundles come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Http,
    Local,
}

impl FromStr for TransportKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(TransportKind::Http),
            "local" => Ok(TransportKind::Local),
            _ => anyhow::bail!("Invalid AQI_TRANSPORT: {}. Must be 'http' or 'local'", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransportEnvConfig {
    pub kind: TransportKind,
    pub base_url: String,
    pub api_token: Option<String>,
    pub local_dir: PathBuf,

    // Fetcher backoff
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,

    // HTTP client
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub middleware_retries: u32,
}

impl TransportEnvConfig {
    pub fn from_env() -> Result<Self> {
        let kind = env::var("AQI_TRANSPORT")
            .unwrap_or_else(|_| "local".to_string())
            .parse::<TransportKind>()?;

        let max_attempts = parse_or("AQI_FETCH_MAX_ATTEMPTS", 3u32)?;
        if max_attempts == 0 {
            anyhow::bail!("AQI_FETCH_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            kind,
            base_url: env::var("AQI_ARTIFACT_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string()),
            api_token: env::var("AQI_ARTIFACT_TOKEN").ok().filter(|t| !t.is_empty()),
            local_dir: PathBuf::from(env::var("AQI_ARTIFACT_DIR").unwrap_or_else(|_| "artifacts".to_string())),
            max_attempts,
            base_delay_ms: parse_u64("AQI_FETCH_BASE_DELAY_MS", 500)?,
            max_delay_ms: parse_u64("AQI_FETCH_MAX_DELAY_MS", 10_000)?,
            timeout_secs: parse_u64("AQI_HTTP_TIMEOUT_SECS", 30)?,
            connect_timeout_secs: parse_u64("AQI_HTTP_CONNECT_TIMEOUT_SECS", 10)?,
            middleware_retries: parse_or("AQI_HTTP_MIDDLEWARE_RETRIES", 1u32)?,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms.max(self.base_delay_ms)),
        }
    }

    pub fn http_settings(&self) -> HttpClientSettings {
        HttpClientSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            middleware_retries: self.middleware_retries,
        }
    }
}
