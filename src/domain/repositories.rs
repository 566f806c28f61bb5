//! Repository Pattern Abstractions
//!
//! Persistence seams for the three durable artifacts of the pipeline:
//! - `CanonicalStore`: the historical feature log (source of truth for training)
//! - `SnapshotStore`: the keyed online snapshot
//! - `ModelRegistry`: versioned candidates, decisions and deployment pointers
//!
//! SQLite and file-backed implementations live in `infrastructure::persistence`,
//! in-memory ones in `infrastructure::repositories`.

use crate::domain::features::{CanonicalDataset, OnlineSnapshot};
use crate::domain::ml::{AlgorithmTag, DeployedModel, Horizon, ModelCandidate, PromotionDecision, RegistryEntry};
use anyhow::Result;
use async_trait::async_trait;

/// Durable home of the canonical dataset
pub trait CanonicalStore: Send + Sync {
    /// Load the dataset; an absent store is an empty dataset
    fn load(&self) -> Result<CanonicalDataset>;

    /// Replace the persisted dataset. Must be all-or-nothing.
    fn commit(&self, dataset: &CanonicalDataset) -> Result<()>;
}

/// Durable home of the online snapshot
pub trait SnapshotStore: Send + Sync {
    fn load(&self) -> Result<Option<OnlineSnapshot>>;

    /// Replace the persisted snapshot. Must be all-or-nothing.
    fn replace(&self, snapshot: &OnlineSnapshot) -> Result<()>;
}

/// Append-only store of candidates, decisions and the active model pointer.
///
/// The only place deployment pointers change.
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Record a candidate and its decision, returning the new version id.
    /// Versions start at 1 and increase by one per horizon. When the
    /// decision is a promotion, the active pointer moves in the same write.
    async fn append(&self, candidate: &ModelCandidate, decision: &PromotionDecision) -> Result<u64>;

    async fn get_active(&self, horizon: Horizon) -> Result<Option<DeployedModel>>;

    /// Most recent first
    async fn list_history(&self, horizon: Horizon, limit: usize) -> Result<Vec<RegistryEntry>> {
        self.list_history_filtered(horizon, limit, None).await
    }

    /// Most recent first, optionally restricted to one algorithm family.
    /// `limit` applies after the filter.
    async fn list_history_filtered(
        &self,
        horizon: Horizon,
        limit: usize,
        algorithm: Option<&AlgorithmTag>,
    ) -> Result<Vec<RegistryEntry>>;

    /// Deployment that preceded the active one
    async fn rollback_target(&self, horizon: Horizon) -> Result<Option<DeployedModel>>;
}
