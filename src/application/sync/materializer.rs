use crate::domain::errors::MaterializationError;
use crate::domain::features::{CanonicalDataset, FeatureRecord, OnlineSnapshot};
use crate::domain::ml::feature_registry::ForwardFill;
use crate::domain::repositories::SnapshotStore;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info};

/// Shared reference to the live snapshot. Readers clone the inner `Arc`
/// and keep reading it even while a newer one is swapped in.
pub type SnapshotHandle = Arc<RwLock<Arc<OnlineSnapshot>>>;

/// Which part of the canonical dataset gets projected
#[derive(Debug, Clone, Default)]
pub struct MaterializationScope {
    /// `None` means every entity in the dataset
    pub entities: Option<Vec<String>>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl MaterializationScope {
    pub fn all() -> Self {
        Self::default()
    }

    fn admits(&self, record: &FeatureRecord, entities: &Option<HashSet<&str>>) -> bool {
        if let Some(set) = entities
            && !set.contains(record.entity_id.as_str())
        {
            return false;
        }
        if let Some(since) = self.since
            && record.timestamp < since
        {
            return false;
        }
        if let Some(until) = self.until
            && record.timestamp > until
        {
            return false;
        }
        true
    }
}

/// Only writer of the online snapshot. Each run builds a complete new
/// snapshot, persists it, then swaps the shared reference.
pub struct MaterializationEngine {
    store: Arc<dyn SnapshotStore>,
    current: SnapshotHandle,
}

impl MaterializationEngine {
    pub fn new(store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            store,
            current: Arc::new(RwLock::new(Arc::new(OnlineSnapshot::default()))),
        }
    }

    /// Start from whatever snapshot the store already holds
    pub fn restore(store: Arc<dyn SnapshotStore>) -> anyhow::Result<Self> {
        let existing = store.load()?.unwrap_or_default();
        info!(
            "MaterializationEngine: restored snapshot generation {} ({} entities)",
            existing.generation,
            existing.len()
        );
        Ok(Self {
            store,
            current: Arc::new(RwLock::new(Arc::new(existing))),
        })
    }

    pub fn handle(&self) -> SnapshotHandle {
        self.current.clone()
    }

    pub fn current(&self) -> Arc<OnlineSnapshot> {
        self.current.read().clone()
    }

    /// Latest in-scope record per entity, with weather gaps forward-filled
    /// from that entity's history the same way training fills them
    pub fn build(
        dataset: &CanonicalDataset,
        scope: &MaterializationScope,
        generation: u64,
        now: DateTime<Utc>,
    ) -> OnlineSnapshot {
        let entity_filter: Option<HashSet<&str>> = scope
            .entities
            .as_ref()
            .map(|list| list.iter().map(String::as_str).collect());

        let mut entries = BTreeMap::new();
        let mut fills: HashMap<&str, ForwardFill> = HashMap::new();
        // Dataset iterates chronologically, so later inserts are newer.
        // History before `since` still feeds the forward fill.
        for record in dataset.iter() {
            if let Some(set) = &entity_filter
                && !set.contains(record.entity_id.as_str())
            {
                continue;
            }
            let filled = fills.entry(record.entity_id.as_str()).or_default().fill_record(record);
            if scope.admits(record, &entity_filter) {
                entries.insert(record.entity_id.clone(), filled);
            }
        }

        OnlineSnapshot {
            generation,
            built_at: Some(now),
            entries,
        }
    }

    pub fn materialize(
        &self,
        dataset: &CanonicalDataset,
        scope: &MaterializationScope,
        now: DateTime<Utc>,
    ) -> Result<Arc<OnlineSnapshot>, MaterializationError> {
        let generation = self.current.read().generation + 1;
        let snapshot = Self::build(dataset, scope, generation, now);

        if let Err(e) = self.store.replace(&snapshot) {
            error!(
                "MaterializationEngine: failed to persist generation {}: {:#}. Keeping generation {}",
                generation,
                e,
                generation - 1
            );
            return Err(MaterializationError::WriteFailure {
                reason: format!("{:#}", e),
            });
        }

        let snapshot = Arc::new(snapshot);
        *self.current.write() = snapshot.clone();

        info!(
            "MaterializationEngine: swapped in generation {} with {} entities",
            snapshot.generation,
            snapshot.len()
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct MemoryStore {
        saved: parking_lot::Mutex<Option<OnlineSnapshot>>,
        fail: AtomicBool,
    }

    impl SnapshotStore for MemoryStore {
        fn load(&self) -> anyhow::Result<Option<OnlineSnapshot>> {
            Ok(self.saved.lock().clone())
        }

        fn replace(&self, snapshot: &OnlineSnapshot) -> anyhow::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            *self.saved.lock() = Some(snapshot.clone());
            Ok(())
        }
    }

    fn record(entity: &str, hour: i64, aqi: f64) -> FeatureRecord {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::hours(hour);
        let raw = crate::domain::features::RawFeatureRecord {
            entity_id: Some(entity.to_string()),
            timestamp: Some(ts.to_rfc3339()),
            aqi: Some(aqi),
            ..Default::default()
        };
        FeatureRecord::from_raw(&raw, 1).unwrap()
    }

    fn dataset_with_value(entities: &[&str], aqi: f64) -> CanonicalDataset {
        CanonicalDataset::from_records(
            entities
                .iter()
                .flat_map(|e| (0..3).map(move |h| record(e, h, aqi))),
        )
    }

    #[test]
    fn test_snapshot_keeps_latest_record_per_entity() {
        let dataset = CanonicalDataset::from_records(vec![
            record("isb", 0, 10.0),
            record("isb", 5, 50.0),
            record("lhr", 1, 20.0),
        ]);
        let snapshot = MaterializationEngine::build(&dataset, &MaterializationScope::all(), 1, Utc::now());

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.get("isb").unwrap().aqi, 50.0);
        assert_eq!(snapshot.get("lhr").unwrap().aqi, 20.0);
    }

    #[test]
    fn test_snapshot_forward_fills_weather_from_history() {
        let mut warm = record("isb", 10, 80.0);
        warm.temp = Some(31.5);
        let mut older = record("isb", 0, 70.0);
        older.humidity = Some(44.0);
        let dataset = CanonicalDataset::from_records(vec![older, warm, record("isb", 11, 90.0)]);

        // History before `since` still feeds the fill
        let scope = MaterializationScope {
            since: Some(Utc.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap()),
            ..Default::default()
        };
        let snapshot = MaterializationEngine::build(&dataset, &scope, 1, Utc::now());
        let latest = snapshot.get("isb").unwrap();

        assert_eq!(latest.aqi, 90.0);
        assert_eq!(latest.temp, Some(31.5));
        assert_eq!(latest.humidity, Some(44.0));
        assert_eq!(latest.dew, None);
    }

    #[test]
    fn test_scope_limits_entities_and_time() {
        let dataset = CanonicalDataset::from_records(vec![
            record("isb", 0, 10.0),
            record("isb", 5, 50.0),
            record("lhr", 1, 20.0),
        ]);
        let scope = MaterializationScope {
            entities: Some(vec!["isb".to_string()]),
            since: None,
            until: Some(Utc.with_ymd_and_hms(2024, 3, 1, 2, 0, 0).unwrap()),
        };
        let snapshot = MaterializationEngine::build(&dataset, &scope, 1, Utc::now());

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("isb").unwrap().aqi, 10.0);
    }

    #[test]
    fn test_failed_write_keeps_prior_snapshot() {
        let store = Arc::new(MemoryStore::default());
        let engine = MaterializationEngine::new(store.clone());

        engine
            .materialize(&dataset_with_value(&["isb"], 10.0), &MaterializationScope::all(), Utc::now())
            .unwrap();
        store.fail.store(true, Ordering::SeqCst);

        let result = engine.materialize(&dataset_with_value(&["isb"], 99.0), &MaterializationScope::all(), Utc::now());

        assert!(matches!(result, Err(MaterializationError::WriteFailure { .. })));
        let current = engine.current();
        assert_eq!(current.generation, 1);
        assert_eq!(current.get("isb").unwrap().aqi, 10.0);
        assert_eq!(store.load().unwrap().unwrap().generation, 1);
    }

    #[test]
    fn test_restore_continues_generation_count() {
        let store = Arc::new(MemoryStore::default());
        let engine = MaterializationEngine::new(store.clone());
        engine
            .materialize(&dataset_with_value(&["isb"], 10.0), &MaterializationScope::all(), Utc::now())
            .unwrap();

        let restored = MaterializationEngine::restore(store).unwrap();
        let next = restored
            .materialize(&dataset_with_value(&["isb"], 11.0), &MaterializationScope::all(), Utc::now())
            .unwrap();
        assert_eq!(next.generation, 2);
    }

    #[test]
    fn test_concurrent_readers_never_see_a_mixture() {
        let entities = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let engine = Arc::new(MaterializationEngine::new(Arc::new(MemoryStore::default())));
        engine
            .materialize(&dataset_with_value(&entities, 0.0), &MaterializationScope::all(), Utc::now())
            .unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let handle = engine.handle();
                let done = done.clone();
                std::thread::spawn(move || {
                    let mut observed = 0usize;
                    loop {
                        let finished = done.load(Ordering::SeqCst);
                        let snapshot = handle.read().clone();
                        let values: Vec<f64> = snapshot.entries.values().map(|r| r.aqi).collect();
                        assert_eq!(values.len(), 8);
                        assert!(values.iter().all(|v| *v == values[0]), "mixed snapshot: {:?}", values);
                        assert_eq!(values[0], (snapshot.generation - 1) as f64);
                        observed += 1;
                        if finished {
                            break;
                        }
                    }
                    observed
                })
            })
            .collect();

        for g in 1..200 {
            engine
                .materialize(&dataset_with_value(&entities, g as f64), &MaterializationScope::all(), Utc::now())
                .unwrap();
        }
        done.store(true, Ordering::SeqCst);

        for reader in readers {
            assert!(reader.join().unwrap() > 0);
        }
    }
}
