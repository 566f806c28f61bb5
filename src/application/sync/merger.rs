use crate::domain::errors::MergeError;
use crate::domain::features::{ArtifactBundle, CanonicalDataset, FeatureRecord, RawFeatureRecord};
use serde::Serialize;
use std::collections::btree_map::Entry;
use tracing::{debug, info, warn};

/// How many rejection reasons are kept verbatim in a report
const MAX_REPORTED_REJECTIONS: usize = 20;

/// Outcome of one merge
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergeReport {
    pub run_id: u64,
    /// New keys
    pub added: usize,
    /// Key collisions between different runs (or differing values within a run)
    pub duplicates_resolved: usize,
    /// Collisions where the incoming record took the slot
    pub replaced: usize,
    /// Exact re-deliveries from the same run
    pub unchanged: usize,
    pub rejected: usize,
    pub rejections: Vec<String>,
    pub total_records: usize,
    pub dataset_digest: String,
}

impl MergeReport {
    /// True when the merged dataset differs from the input dataset
    pub fn changed(&self) -> bool {
        self.added > 0 || self.replaced > 0
    }
}

/// Reconciles staged records into the canonical dataset.
///
/// Collision policy on (entity_id, timestamp): the record from the higher
/// run wins regardless of arrival order. Within one run the last occurrence wins.
#[derive(Debug, Clone, Default)]
pub struct FeatureMerger;

impl FeatureMerger {
    pub fn new() -> Self {
        Self
    }

    /// Merge a whole bundle. Schema problems abort before anything is touched;
    /// invalid records are counted and skipped.
    pub fn merge(
        &self,
        dataset: &CanonicalDataset,
        bundle: &ArtifactBundle,
    ) -> Result<(CanonicalDataset, MergeReport), MergeError> {
        bundle.check_schema()?;
        let (merged, report) = self.merge_records(dataset, &bundle.records, bundle.run_id().0);

        info!(
            "FeatureMerger: run {} -> added={}, duplicates_resolved={}, unchanged={}, rejected={}, total={}",
            report.run_id,
            report.added,
            report.duplicates_resolved,
            report.unchanged,
            report.rejected,
            report.total_records
        );
        Ok((merged, report))
    }

    /// Merge loose records attributed to `source_run`
    pub fn merge_records(
        &self,
        dataset: &CanonicalDataset,
        records: &[RawFeatureRecord],
        source_run: u64,
    ) -> (CanonicalDataset, MergeReport) {
        let mut merged = dataset.clone();
        let mut report = MergeReport {
            run_id: source_run,
            ..Default::default()
        };

        for raw in records {
            let incoming = match FeatureRecord::from_raw(raw, source_run) {
                Ok(record) => record,
                Err(e) => {
                    warn!("FeatureMerger: rejected record: {}", e);
                    report.rejected += 1;
                    if report.rejections.len() < MAX_REPORTED_REJECTIONS {
                        report.rejections.push(e.to_string());
                    }
                    continue;
                }
            };

            match merged.entry(incoming.key()) {
                Entry::Vacant(slot) => {
                    slot.insert(incoming);
                    report.added += 1;
                }
                Entry::Occupied(mut slot) => {
                    let existing = slot.get();
                    if existing.source_run == incoming.source_run && existing.same_values(&incoming) {
                        report.unchanged += 1;
                        continue;
                    }

                    report.duplicates_resolved += 1;
                    if incoming.source_run >= existing.source_run {
                        debug!(
                            "FeatureMerger: {} run {} replaces run {}",
                            slot.key(),
                            incoming.source_run,
                            existing.source_run
                        );
                        slot.insert(incoming);
                        report.replaced += 1;
                    }
                }
            }
        }

        report.total_records = merged.len();
        report.dataset_digest = merged.digest();
        (merged, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn raw(entity: &str, hour: i64, aqi: f64) -> RawFeatureRecord {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::hours(hour);
        RawFeatureRecord {
            entity_id: Some(entity.to_string()),
            timestamp: Some(ts.format("%Y-%m-%d %H:%M:%S").to_string()),
            aqi: Some(aqi),
            ..Default::default()
        }
    }

    fn bundle(run_id: u64, records: Vec<RawFeatureRecord>) -> ArtifactBundle {
        ArtifactBundle::new(run_id, Utc::now(), records)
    }

    #[test]
    fn test_remerging_same_bundle_is_noop() {
        let merger = FeatureMerger::new();
        let b = bundle(10, (0..50).map(|h| raw("isb", h, 100.0 + h as f64)).collect());

        let (first, report1) = merger.merge(&CanonicalDataset::new(), &b).unwrap();
        assert_eq!(report1.added, 50);

        let (second, report2) = merger.merge(&first, &b).unwrap();
        assert_eq!(report2.added, 0);
        assert_eq!(report2.unchanged, 50);
        assert!(!report2.changed());
        assert_eq!(first, second);
        assert_eq!(report1.dataset_digest, report2.dataset_digest);
    }

    #[test]
    fn test_higher_run_wins_regardless_of_order() {
        let merger = FeatureMerger::new();
        let older = bundle(10, vec![raw("isb", 0, 80.0)]);
        let newer = bundle(11, vec![raw("isb", 0, 95.0)]);

        let (a, _) = merger.merge(&CanonicalDataset::new(), &older).unwrap();
        let (a, report_a) = merger.merge(&a, &newer).unwrap();

        let (b, _) = merger.merge(&CanonicalDataset::new(), &newer).unwrap();
        let (b, report_b) = merger.merge(&b, &older).unwrap();

        assert_eq!(a, b);
        let kept = a.iter().next().unwrap();
        assert_eq!(kept.aqi, 95.0);
        assert_eq!(kept.source_run, 11);
        assert_eq!(report_a.duplicates_resolved, 1);
        assert_eq!(report_a.replaced, 1);
        assert_eq!(report_b.duplicates_resolved, 1);
        assert_eq!(report_b.replaced, 0);
    }

    #[test]
    fn test_naive_and_aware_neighbours_merge_without_error() {
        let merger = FeatureMerger::new();
        let mut aware = raw("isb", 0, 70.0);
        aware.timestamp = Some("2024-03-01T06:00:00+05:00".to_string()); // 01:00 UTC
        let mut naive = raw("isb", 0, 72.0);
        naive.timestamp = Some("2024-03-01 02:00:00".to_string());
        let mut same_instant = raw("isb", 0, 71.0);
        same_instant.timestamp = Some("2024-03-01 01:00:00".to_string());

        let (dataset, report) = merger
            .merge(&CanonicalDataset::new(), &bundle(4, vec![aware, naive, same_instant]))
            .unwrap();

        assert_eq!(report.added, 2);
        assert_eq!(report.duplicates_resolved, 1);
        let aqis: Vec<f64> = dataset.iter().map(|r| r.aqi).collect();
        assert_eq!(aqis, vec![71.0, 72.0]);
    }

    #[test]
    fn test_invalid_records_are_counted() {
        let merger = FeatureMerger::new();
        let mut no_ts = raw("isb", 1, 50.0);
        no_ts.timestamp = None;
        let records = vec![raw("isb", 0, 50.0), no_ts, raw("isb", 2, 9000.0)];

        let (dataset, report) = merger
            .merge(&CanonicalDataset::new(), &bundle(1, records))
            .unwrap();

        assert_eq!(dataset.len(), 1);
        assert_eq!(report.rejected, 2);
        assert_eq!(report.rejections.len(), 2);
    }

    #[test]
    fn test_schema_mismatch_aborts_merge() {
        let merger = FeatureMerger::new();
        let mut b = bundle(1, vec![raw("isb", 0, 50.0)]);
        b.meta.record_count = 5;

        assert!(matches!(
            merger.merge(&CanonicalDataset::new(), &b),
            Err(MergeError::SchemaMismatch { .. })
        ));
    }
}
