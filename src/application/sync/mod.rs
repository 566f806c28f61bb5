// Remote bundle -> canonical dataset -> online snapshot
pub mod fetcher;
pub mod freshness;
pub mod materializer;
pub mod merger;

pub use fetcher::{ArtifactFetcher, RetryPolicy, SelectionPolicy, StagedBundle};
pub use freshness::{FreshnessPolicy, FreshnessVerifier, Readiness};
pub use materializer::{MaterializationEngine, MaterializationScope, SnapshotHandle};
pub use merger::{FeatureMerger, MergeReport};
