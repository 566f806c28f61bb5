//! In-Memory Repository Implementations
//!
//! Thread-safe, in-memory implementations of the traits in
//! `domain::repositories`. Used by tests and for dry runs where nothing
//! should touch the disk.
//!
//! # Limitations
//!
//! - Data is lost on process exit
//! - No sharing across processes
//!
//! For durable storage use `infrastructure::persistence`.

use crate::domain::features::{CanonicalDataset, OnlineSnapshot};
use crate::domain::ml::{AlgorithmTag, DeployedModel, Horizon, ModelCandidate, PromotionDecision, RegistryEntry};
use crate::domain::repositories::{CanonicalStore, ModelRegistry, SnapshotStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct HorizonLedger {
    entries: Vec<RegistryEntry>,
    /// (version, promoted_at), oldest first
    deployments: Vec<(u64, DateTime<Utc>)>,
}

impl HorizonLedger {
    fn deployed_at(&self, index_from_end: usize) -> Option<DeployedModel> {
        let position = self.deployments.len().checked_sub(index_from_end + 1)?;
        let (version, promoted_at) = self.deployments[position];
        let entry = self.entries.iter().find(|e| e.version == version)?;
        Some(DeployedModel {
            version,
            promoted_at,
            candidate: entry.candidate.clone(),
        })
    }
}

/// In-memory implementation of ModelRegistry
pub struct InMemoryModelRegistry {
    ledgers: Arc<RwLock<HashMap<Horizon, HorizonLedger>>>,
}

impl InMemoryModelRegistry {
    pub fn new() -> Self {
        Self {
            ledgers: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryModelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelRegistry for InMemoryModelRegistry {
    async fn append(&self, candidate: &ModelCandidate, decision: &PromotionDecision) -> Result<u64> {
        let mut ledgers = self.ledgers.write().await;
        let ledger = ledgers.entry(candidate.horizon).or_default();

        let version = ledger.entries.last().map(|e| e.version).unwrap_or(0) + 1;
        ledger.entries.push(RegistryEntry {
            version,
            candidate: candidate.clone(),
            decision: decision.clone(),
            deployed: decision.promoted,
        });
        if decision.promoted {
            ledger.deployments.push((version, decision.decided_at));
        }
        Ok(version)
    }

    async fn get_active(&self, horizon: Horizon) -> Result<Option<DeployedModel>> {
        let ledgers = self.ledgers.read().await;
        Ok(ledgers.get(&horizon).and_then(|l| l.deployed_at(0)))
    }

    async fn list_history_filtered(
        &self,
        horizon: Horizon,
        limit: usize,
        algorithm: Option<&AlgorithmTag>,
    ) -> Result<Vec<RegistryEntry>> {
        let ledgers = self.ledgers.read().await;
        Ok(ledgers
            .get(&horizon)
            .map(|l| {
                l.entries
                    .iter()
                    .rev()
                    .filter(|e| algorithm.is_none_or(|tag| e.candidate.algorithm == *tag))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn rollback_target(&self, horizon: Horizon) -> Result<Option<DeployedModel>> {
        let ledgers = self.ledgers.read().await;
        Ok(ledgers.get(&horizon).and_then(|l| l.deployed_at(1)))
    }
}

/// In-memory implementation of CanonicalStore
#[derive(Default)]
pub struct InMemoryCanonicalStore {
    dataset: parking_lot::RwLock<CanonicalDataset>,
    commits: parking_lot::RwLock<usize>,
}

impl InMemoryCanonicalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful commits so far
    pub fn commit_count(&self) -> usize {
        *self.commits.read()
    }
}

impl CanonicalStore for InMemoryCanonicalStore {
    fn load(&self) -> Result<CanonicalDataset> {
        Ok(self.dataset.read().clone())
    }

    fn commit(&self, dataset: &CanonicalDataset) -> Result<()> {
        *self.dataset.write() = dataset.clone();
        *self.commits.write() += 1;
        Ok(())
    }
}

/// In-memory implementation of SnapshotStore
#[derive(Default)]
pub struct InMemorySnapshotStore {
    snapshot: parking_lot::RwLock<Option<OnlineSnapshot>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn load(&self) -> Result<Option<OnlineSnapshot>> {
        Ok(self.snapshot.read().clone())
    }

    fn replace(&self, snapshot: &OnlineSnapshot) -> Result<()> {
        *self.snapshot.write() = Some(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ml::{DecisionReason, EvaluationMetrics, ModelArtifact, TrainingWindow};

    fn candidate(horizon: u32, rmse: f64) -> ModelCandidate {
        ModelCandidate {
            horizon: Horizon(horizon),
            algorithm: AlgorithmTag::new("ridge_regression"),
            artifact: ModelArtifact {
                algorithm: AlgorithmTag::new("ridge_regression"),
                payload: "{}".to_string(),
            },
            metrics: EvaluationMetrics {
                mae: rmse,
                rmse,
                r2: 0.1,
                mape: None,
                mape_excluded: 0,
                n_test: 5,
            },
            window: TrainingWindow {
                start: Utc::now(),
                end: Utc::now(),
                n_train: 10,
                n_test: 5,
            },
            trained_at: Utc::now(),
        }
    }

    fn decision(horizon: u32, promoted: bool) -> PromotionDecision {
        PromotionDecision {
            horizon: Horizon(horizon),
            promoted,
            reason: if promoted {
                DecisionReason::Improved
            } else {
                DecisionReason::NotImproved
            },
            candidate_rmse: 0.0,
            incumbent_version: None,
            incumbent_rmse: None,
            decided_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_versions_are_per_horizon() {
        let registry = InMemoryModelRegistry::new();

        assert_eq!(registry.append(&candidate(24, 10.0), &decision(24, true)).await.unwrap(), 1);
        assert_eq!(registry.append(&candidate(24, 9.0), &decision(24, false)).await.unwrap(), 2);
        assert_eq!(registry.append(&candidate(48, 9.0), &decision(48, true)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_active_and_rollback_target() {
        let registry = InMemoryModelRegistry::new();
        registry.append(&candidate(24, 10.0), &decision(24, true)).await.unwrap();
        registry.append(&candidate(24, 12.0), &decision(24, false)).await.unwrap();
        registry.append(&candidate(24, 8.0), &decision(24, true)).await.unwrap();

        let active = registry.get_active(Horizon(24)).await.unwrap().unwrap();
        let rollback = registry.rollback_target(Horizon(24)).await.unwrap().unwrap();
        assert_eq!(active.version, 3);
        assert_eq!(rollback.version, 1);

        let history = registry.list_history(Horizon(24), 2).await.unwrap();
        let versions: Vec<u64> = history.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![3, 2]);
        assert!(!history[1].deployed);
    }

    #[tokio::test]
    async fn test_history_filtered_by_algorithm() {
        let registry = InMemoryModelRegistry::new();
        let mut forest = candidate(24, 11.0);
        forest.algorithm = AlgorithmTag::new("random_forest");
        registry.append(&candidate(24, 12.0), &decision(24, true)).await.unwrap();
        registry.append(&forest, &decision(24, true)).await.unwrap();
        registry.append(&candidate(24, 10.0), &decision(24, true)).await.unwrap();

        let ridge = AlgorithmTag::new("ridge_regression");
        let history = registry.list_history_filtered(Horizon(24), 5, Some(&ridge)).await.unwrap();
        let versions: Vec<u64> = history.iter().map(|e| e.version).collect();
        assert_eq!(versions, vec![3, 1]);

        let limited = registry.list_history_filtered(Horizon(24), 1, Some(&ridge)).await.unwrap();
        assert_eq!(limited[0].version, 3);
        assert_eq!(registry.list_history(Horizon(24), 5).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_horizon() {
        let registry = InMemoryModelRegistry::new();
        assert!(registry.get_active(Horizon(72)).await.unwrap().is_none());
        assert!(registry.rollback_target(Horizon(72)).await.unwrap().is_none());
        assert!(registry.list_history(Horizon(72), 5).await.unwrap().is_empty());
    }

    #[test]
    fn test_canonical_store_counts_commits() {
        let store = InMemoryCanonicalStore::new();
        assert!(store.load().unwrap().is_empty());
        store.commit(&CanonicalDataset::new()).unwrap();
        assert_eq!(store.commit_count(), 1);
    }
}
