use super::record::{FeatureKey, FeatureRecord};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

/// Deduplicated, time-ordered union of every merged record.
///
/// Only the merger mutates it; everyone else reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalDataset {
    records: BTreeMap<FeatureKey, FeatureRecord>,
}

impl CanonicalDataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from already-validated records. Later duplicates win, as in a log replay.
    pub fn from_records(records: impl IntoIterator<Item = FeatureRecord>) -> Self {
        let mut dataset = Self::new();
        for record in records {
            dataset.records.insert(record.key(), record);
        }
        dataset
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &FeatureKey) -> Option<&FeatureRecord> {
        self.records.get(key)
    }

    /// Records in (timestamp, entity_id) order
    pub fn iter(&self) -> impl Iterator<Item = &FeatureRecord> {
        self.records.values()
    }

    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.records.keys().next_back().map(|k| k.timestamp)
    }

    pub fn earliest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.records.keys().next().map(|k| k.timestamp)
    }

    /// Records of one entity, oldest first
    pub fn entity_records<'a>(&'a self, entity_id: &'a str) -> impl Iterator<Item = &'a FeatureRecord> {
        self.records.values().filter(move |r| r.entity_id == entity_id)
    }

    pub fn entities(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.keys().map(|k| k.entity_id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    pub(crate) fn entry(&mut self, key: FeatureKey) -> Entry<'_, FeatureKey, FeatureRecord> {
        self.records.entry(key)
    }

    /// SHA-256 over the ordered records, hex encoded. Equal digests mean
    /// byte-identical persisted logs.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for record in self.records.values() {
            // serde_json output is deterministic for a fixed struct layout
            if let Ok(line) = serde_json::to_vec(record) {
                hasher.update(&line);
            }
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}
