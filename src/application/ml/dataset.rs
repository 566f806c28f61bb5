//! Supervised dataset construction for one forecast horizon.
//!
//! A sample observed at `T` is labelled with the same entity's AQI at
//! exactly `T + horizon`. Samples without such an observation are dropped,
//! so longer horizons always have fewer samples to work with.

use crate::domain::errors::TrainingError;
use crate::domain::features::CanonicalDataset;
use crate::domain::ml::feature_registry::ForwardFill;
use crate::domain::ml::{Horizon, TrainingWindow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

/// Extra hours of history recommended beyond the horizon itself
pub const RECOMMENDED_SPAN_MARGIN_HOURS: u32 = 10;

#[derive(Debug, Clone)]
pub struct SplitPolicy {
    /// Leading fraction of samples used for training
    pub train_ratio: f64,
    pub min_train: usize,
    pub min_test: usize,
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self {
            train_ratio: 0.7,
            min_train: 5,
            min_test: 2,
        }
    }
}

impl SplitPolicy {
    /// (train, test) sizes for `n` samples
    pub fn sizes(&self, n: usize) -> (usize, usize) {
        let n_train = ((n as f64) * self.train_ratio).round() as usize;
        let n_train = n_train.min(n);
        (n_train, n - n_train)
    }
}

/// Chronologically split training data for one horizon
#[derive(Debug, Clone)]
pub struct SupervisedSet {
    pub horizon: Horizon,
    pub x_train: Vec<Vec<f64>>,
    pub y_train: Vec<f64>,
    pub x_test: Vec<Vec<f64>>,
    pub y_test: Vec<f64>,
    pub window: TrainingWindow,
}

impl SupervisedSet {
    pub fn total_samples(&self) -> usize {
        self.y_train.len() + self.y_test.len()
    }
}

/// A horizon that could not be trained this cycle
#[derive(Debug, Clone, Serialize)]
pub struct SkippedHorizon {
    pub horizon: Horizon,
    pub available_samples: usize,
    pub reason: String,
    pub recommended_span_hours: u32,
}

#[derive(Debug, Clone)]
pub enum HorizonDataset {
    Trainable(SupervisedSet),
    Skipped(SkippedHorizon),
}

struct Sample {
    timestamp: DateTime<Utc>,
    entity_id: String,
    features: Vec<f64>,
    label: f64,
}

pub fn build_horizon_dataset(
    dataset: &CanonicalDataset,
    horizon: Horizon,
    policy: &SplitPolicy,
) -> HorizonDataset {
    let mut samples = labelled_samples(dataset, horizon);
    samples.sort_by(|a, b| (a.timestamp, &a.entity_id).cmp(&(b.timestamp, &b.entity_id)));

    let n = samples.len();
    let (n_train, n_test) = policy.sizes(n);

    if n_train < policy.min_train || n_test < policy.min_test {
        let error = TrainingError::InsufficientData {
            train: n_train,
            test: n_test,
            min_train: policy.min_train,
            min_test: policy.min_test,
        };
        let recommended_span_hours = horizon.hours() + RECOMMENDED_SPAN_MARGIN_HOURS;
        warn!(
            "Dataset {}: {} labelled samples out of {} records. {}. Recommend at least {}h of data",
            horizon,
            n,
            dataset.len(),
            error,
            recommended_span_hours
        );
        return HorizonDataset::Skipped(SkippedHorizon {
            horizon,
            available_samples: n,
            reason: error.to_string(),
            recommended_span_hours,
        });
    }

    // Non-empty: n_train >= min_train and n_test >= min_test
    let window = TrainingWindow {
        start: samples[0].timestamp,
        end: samples[n - 1].timestamp,
        n_train,
        n_test,
    };

    let mut x_train = Vec::with_capacity(n_train);
    let mut y_train = Vec::with_capacity(n_train);
    let mut x_test = Vec::with_capacity(n_test);
    let mut y_test = Vec::with_capacity(n_test);
    for (i, sample) in samples.into_iter().enumerate() {
        if i < n_train {
            x_train.push(sample.features);
            y_train.push(sample.label);
        } else {
            x_test.push(sample.features);
            y_test.push(sample.label);
        }
    }

    info!(
        "Dataset {}: {} records -> {} labelled samples ({} train / {} test)",
        horizon,
        dataset.len(),
        n,
        n_train,
        n_test
    );

    HorizonDataset::Trainable(SupervisedSet {
        horizon,
        x_train,
        y_train,
        x_test,
        y_test,
        window,
    })
}

fn labelled_samples(dataset: &CanonicalDataset, horizon: Horizon) -> Vec<Sample> {
    let lead = horizon.duration();
    let mut samples = Vec::new();

    for entity in dataset.entities() {
        let aqi_at: HashMap<DateTime<Utc>, f64> = dataset
            .entity_records(&entity)
            .map(|r| (r.timestamp, r.aqi))
            .collect();

        // Forward-fill sees every record so gaps are filled from the true predecessor
        let mut fill = ForwardFill::default();
        for record in dataset.entity_records(&entity) {
            let features = fill.fill(record);
            if let Some(label) = aqi_at.get(&(record.timestamp + lead)) {
                samples.push(Sample {
                    timestamp: record.timestamp,
                    entity_id: entity.clone(),
                    features,
                    label: *label,
                });
            }
        }
    }

    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::features::{FeatureRecord, RawFeatureRecord};
    use chrono::{Duration, TimeZone};

    fn hourly(entity: &str, hours: std::ops::Range<i64>) -> Vec<FeatureRecord> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        hours
            .map(|h| {
                let raw = RawFeatureRecord {
                    entity_id: Some(entity.to_string()),
                    timestamp: Some((start + Duration::hours(h)).to_rfc3339()),
                    aqi: Some(50.0 + h as f64),
                    temp: if h % 2 == 0 { Some(25.0) } else { None },
                    ..Default::default()
                };
                FeatureRecord::from_raw(&raw, 1).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_120_hourly_records_at_72h_yield_48_samples_split_34_14() {
        let dataset = CanonicalDataset::from_records(hourly("isb", 0..120));

        let HorizonDataset::Trainable(set) =
            build_horizon_dataset(&dataset, Horizon(72), &SplitPolicy::default())
        else {
            panic!("expected trainable horizon");
        };

        assert_eq!(set.total_samples(), 48);
        assert_eq!(set.x_train.len(), 34);
        assert_eq!(set.x_test.len(), 14);
        assert_eq!(set.window.n_train, 34);
        assert_eq!(set.window.n_test, 14);
    }

    #[test]
    fn test_labels_come_from_t_plus_h() {
        let dataset = CanonicalDataset::from_records(hourly("isb", 0..40));

        let HorizonDataset::Trainable(set) =
            build_horizon_dataset(&dataset, Horizon(24), &SplitPolicy::default())
        else {
            panic!("expected trainable horizon");
        };

        // aqi at hour h is 50 + h, so the label of the first sample (h=0) is 74
        assert_eq!(set.y_train[0], 74.0);
        assert_eq!(*set.y_test.last().unwrap(), 50.0 + 15.0 + 24.0);
    }

    #[test]
    fn test_split_is_chronological() {
        let mut records = hourly("isb", 0..60);
        records.extend(hourly("lhr", 0..60));
        let dataset = CanonicalDataset::from_records(records);

        let HorizonDataset::Trainable(set) =
            build_horizon_dataset(&dataset, Horizon(24), &SplitPolicy::default())
        else {
            panic!("expected trainable horizon");
        };

        // labels grow with time, so every training label precedes every test label
        let last_train = set.y_train.iter().cloned().fold(f64::MIN, f64::max);
        let first_test = set.y_test.iter().cloned().fold(f64::MAX, f64::min);
        assert!(last_train <= first_test);
        assert!(set.window.start < set.window.end);
    }

    #[test]
    fn test_forward_fill_uses_previous_record() {
        let dataset = CanonicalDataset::from_records(hourly("isb", 0..40));

        let HorizonDataset::Trainable(set) =
            build_horizon_dataset(&dataset, Horizon(24), &SplitPolicy::default())
        else {
            panic!("expected trainable horizon");
        };

        // temp (column 4) is only reported on even hours; odd hours carry it forward
        assert!(set.x_train.iter().all(|x| x[4] == 25.0));
    }

    #[test]
    fn test_short_history_is_skipped_with_recommendation() {
        let dataset = CanonicalDataset::from_records(hourly("isb", 0..76));

        let HorizonDataset::Skipped(skipped) =
            build_horizon_dataset(&dataset, Horizon(72), &SplitPolicy::default())
        else {
            panic!("expected skipped horizon");
        };

        assert_eq!(skipped.available_samples, 4);
        assert_eq!(skipped.recommended_span_hours, 82);
    }

    #[test]
    fn test_split_sizes_round() {
        let policy = SplitPolicy::default();
        assert_eq!(policy.sizes(48), (34, 14));
        assert_eq!(policy.sizes(10), (7, 3));
        assert_eq!(policy.sizes(0), (0, 0));
    }
}
