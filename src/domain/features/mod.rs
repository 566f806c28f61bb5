pub mod bundle;
pub mod dataset;
pub mod record;
pub mod snapshot;

pub use bundle::{ArtifactBundle, BundleMeta, RunId, RunStatus};
pub use dataset::CanonicalDataset;
pub use record::{FeatureKey, FeatureRecord, Pollutant, RawFeatureRecord};
pub use snapshot::OnlineSnapshot;
