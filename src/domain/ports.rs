use crate::domain::errors::{FetchError, TrainingError};
use crate::domain::features::{ArtifactBundle, BundleMeta, RunId};
use crate::domain::ml::{AlgorithmTag, ModelArtifact};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Where upstream runs publish their bundles
#[async_trait]
pub trait ArtifactTransport: Send + Sync {
    /// Bundles created at or after `since`, in no particular order
    async fn list_bundles_since(&self, since: DateTime<Utc>) -> Result<Vec<BundleMeta>, FetchError>;

    async fn fetch_bundle(&self, run_id: RunId) -> Result<ArtifactBundle, FetchError>;
}

/// An algorithm family. The trainer only ever talks to this trait.
pub trait Regressor: Send + Sync {
    fn tag(&self) -> AlgorithmTag;

    /// Fit on a training split. Failing to produce a usable model is a
    /// `TrainingError::ConvergenceFailure`.
    fn fit(&self, x: &[Vec<f64>], y: &[f64]) -> Result<Box<dyn FittedModel>, TrainingError>;
}

/// A trained model ready to predict
pub trait FittedModel: Send + Sync {
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, TrainingError>;

    fn to_artifact(&self) -> Result<ModelArtifact, TrainingError>;
}
