use super::record::RawFeatureRecord;
use crate::domain::errors::MergeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const BUNDLE_SCHEMA_VERSION: u32 = 1;

/// Identifier of the upstream run that produced a bundle. Higher is newer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    InProgress,
    Failed,
}

/// Provenance of a bundle, as listed by the artifact transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMeta {
    pub run_id: RunId,
    pub created_at: DateTime<Utc>,
    pub record_count: usize,
    pub status: RunStatus,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

fn default_schema_version() -> u32 {
    BUNDLE_SCHEMA_VERSION
}

/// A batch of upstream records. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactBundle {
    pub meta: BundleMeta,
    pub records: Vec<RawFeatureRecord>,
}

impl ArtifactBundle {
    pub fn new(run_id: u64, created_at: DateTime<Utc>, records: Vec<RawFeatureRecord>) -> Self {
        Self {
            meta: BundleMeta {
                run_id: RunId(run_id),
                created_at,
                record_count: records.len(),
                status: RunStatus::Completed,
                schema_version: BUNDLE_SCHEMA_VERSION,
            },
            records,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.meta.run_id
    }

    /// Bundle-level consistency. Individual records are validated at merge time.
    pub fn check_schema(&self) -> Result<(), MergeError> {
        if self.meta.schema_version != BUNDLE_SCHEMA_VERSION {
            return Err(MergeError::SchemaMismatch {
                reason: format!(
                    "bundle {} has schema v{}, expected v{}",
                    self.meta.run_id, self.meta.schema_version, BUNDLE_SCHEMA_VERSION
                ),
            });
        }
        if self.meta.record_count != self.records.len() {
            return Err(MergeError::SchemaMismatch {
                reason: format!(
                    "bundle {} declares {} records but contains {}",
                    self.meta.run_id,
                    self.meta.record_count,
                    self.records.len()
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_count_mismatch_is_schema_error() {
        let mut bundle = ArtifactBundle::new(3, Utc::now(), vec![RawFeatureRecord::default()]);
        assert!(bundle.check_schema().is_ok());

        bundle.meta.record_count = 2;
        assert!(matches!(
            bundle.check_schema(),
            Err(MergeError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_missing_schema_version_defaults_to_current() {
        let json = r#"{"meta":{"run_id":12,"created_at":"2024-03-01T10:00:00Z","record_count":0,"status":"completed"},"records":[]}"#;
        let bundle: ArtifactBundle = serde_json::from_str(json).unwrap();
        assert_eq!(bundle.run_id(), RunId(12));
        assert_eq!(bundle.meta.schema_version, BUNDLE_SCHEMA_VERSION);
    }
}
