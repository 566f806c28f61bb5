use crate::domain::errors::FetchError;
use crate::domain::features::{ArtifactBundle, BundleMeta, RunId, RunStatus};
use crate::domain::ports::ArtifactTransport;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Which remote bundle to pull
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Newest bundle in the lookback window; must be a completed run
    MostRecentWithinWindow,
    /// Newest completed bundle in the lookback window
    MostRecentCompleted,
    /// A specific run, regardless of the window
    Explicit(RunId),
}

impl FromStr for SelectionPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "latest" => Ok(SelectionPolicy::MostRecentWithinWindow),
            "completed" => Ok(SelectionPolicy::MostRecentCompleted),
            other => {
                let digits = other.strip_prefix("run:").unwrap_or(other);
                match digits.parse::<u64>() {
                    Ok(id) => Ok(SelectionPolicy::Explicit(RunId(id))),
                    Err(_) => anyhow::bail!(
                        "Invalid selection policy: {}. Must be 'latest', 'completed' or a run number",
                        s
                    ),
                }
            }
        }
    }
}

/// Bounded exponential backoff for transport calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): half fixed, half jitter
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let capped = exp.min(self.max_delay);
        let half = capped.as_millis() as u64 / 2;
        let jitter = if half > 0 {
            rand::rng().random_range(0..=half)
        } else {
            0
        };
        Duration::from_millis(half + jitter)
    }
}

/// A bundle written to the staging area
#[derive(Debug, Clone)]
pub struct StagedBundle {
    pub path: PathBuf,
    pub bundle: ArtifactBundle,
}

/// Retrieves the most relevant remote bundle and stages it locally.
/// Never touches the canonical dataset.
pub struct ArtifactFetcher {
    transport: Arc<dyn ArtifactTransport>,
    staging_dir: PathBuf,
    retry: RetryPolicy,
}

impl ArtifactFetcher {
    pub fn new(transport: Arc<dyn ArtifactTransport>, staging_dir: PathBuf, retry: RetryPolicy) -> Self {
        Self {
            transport,
            staging_dir,
            retry,
        }
    }

    pub async fn fetch(
        &self,
        policy: &SelectionPolicy,
        lookback: chrono::Duration,
        now: DateTime<Utc>,
    ) -> Result<StagedBundle, FetchError> {
        let run_id = match policy {
            SelectionPolicy::Explicit(run_id) => *run_id,
            _ => {
                let since = now - lookback;
                let listed = self
                    .with_retry("list_bundles_since", || self.transport.list_bundles_since(since))
                    .await?;
                let selected = select_bundle(&listed, policy, since)?;
                info!(
                    "ArtifactFetcher: selected run {} (created {}, {} records) out of {} listed",
                    selected.run_id,
                    selected.created_at,
                    selected.record_count,
                    listed.len()
                );
                selected.run_id
            }
        };

        let bundle = self
            .with_retry("fetch_bundle", || self.transport.fetch_bundle(run_id))
            .await?;
        let path = self.stage(&bundle)?;

        Ok(StagedBundle { path, bundle })
    }

    async fn with_retry<T, F, Fut>(&self, op: &str, f: F) -> Result<T, FetchError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match f().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        "ArtifactFetcher: {} failed (attempt {}/{}): {}. Retrying in {:?}",
                        op, attempt, max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(FetchError::TransportFailure { reason, .. }) => {
                    return Err(FetchError::TransportFailure {
                        attempts: attempt,
                        reason,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn stage(&self, bundle: &ArtifactBundle) -> Result<PathBuf, FetchError> {
        let path = staged_path(&self.staging_dir, bundle.run_id());
        let write = || -> anyhow::Result<()> {
            fs::create_dir_all(&self.staging_dir)?;
            let tmp = path.with_extension("tmp");
            fs::write(&tmp, serde_json::to_vec(bundle)?)?;
            fs::rename(&tmp, &path)?;
            Ok(())
        };
        write().map_err(|e| FetchError::transport(format!("staging {:?} failed: {:#}", path, e)))?;

        info!("ArtifactFetcher: staged run {} at {:?}", bundle.run_id(), path);
        Ok(path)
    }
}

pub fn staged_path(staging_dir: &Path, run_id: RunId) -> PathBuf {
    staging_dir.join(format!("bundle-{}.json", run_id))
}

/// Pick a bundle among `listed`: latest creation time, ties to the higher run id.
pub fn select_bundle(
    listed: &[BundleMeta],
    policy: &SelectionPolicy,
    window_start: DateTime<Utc>,
) -> Result<BundleMeta, FetchError> {
    let in_window = listed.iter().filter(|m| m.created_at >= window_start);

    match policy {
        SelectionPolicy::MostRecentWithinWindow => {
            let selected = newest(in_window)
                .ok_or_else(|| FetchError::not_found(format!("no bundles since {}", window_start)))?;
            if selected.status != RunStatus::Completed {
                return Err(FetchError::not_found(format!(
                    "newest run {} is not completed ({:?})",
                    selected.run_id, selected.status
                )));
            }
            Ok(selected)
        }
        SelectionPolicy::MostRecentCompleted => {
            newest(in_window.filter(|m| m.status == RunStatus::Completed)).ok_or_else(|| {
                FetchError::not_found(format!("no completed bundles since {}", window_start))
            })
        }
        SelectionPolicy::Explicit(run_id) => listed
            .iter()
            .find(|m| m.run_id == *run_id)
            .cloned()
            .ok_or_else(|| FetchError::not_found(format!("run {} not listed", run_id))),
    }
}

fn newest<'a>(metas: impl Iterator<Item = &'a BundleMeta>) -> Option<BundleMeta> {
    metas
        .max_by(|a, b| (a.created_at, a.run_id).cmp(&(b.created_at, b.run_id)))
        .cloned()
}
