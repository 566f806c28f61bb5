use super::record::FeatureRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One current record per entity, for point lookups by the serving layer.
/// Derived from the canonical dataset and always replaced as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnlineSnapshot {
    /// Incremented on every materialization
    pub generation: u64,
    pub built_at: Option<DateTime<Utc>>,
    pub entries: BTreeMap<String, FeatureRecord>,
}

impl OnlineSnapshot {
    pub fn get(&self, entity_id: &str) -> Option<&FeatureRecord> {
        self.entries.get(entity_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
