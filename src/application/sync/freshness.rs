use crate::domain::errors::ReadinessError;
use crate::domain::features::CanonicalDataset;
use crate::domain::ml::Horizon;
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

/// Outcome of the readiness gate. `NotReady` is a normal result, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    Ready { longest_run: usize, age_hours: f64 },
    NotReady { reason: ReadinessError },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready { .. })
    }

    /// Short human-readable verdict for run summaries
    pub fn verdict(&self) -> String {
        match self {
            Readiness::Ready { longest_run, age_hours } => {
                format!("ready ({} consecutive hourly records, newest {:.1}h old)", longest_run, age_hours)
            }
            Readiness::NotReady { reason } => format!("not_ready: {}", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FreshnessPolicy {
    /// Overrides the `max(horizon) + 1` consecutive-record requirement
    pub min_consecutive_records: Option<usize>,
    pub max_staleness: Duration,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            min_consecutive_records: None,
            max_staleness: Duration::hours(25),
        }
    }
}

pub struct FreshnessVerifier {
    policy: FreshnessPolicy,
}

impl FreshnessVerifier {
    pub fn new(policy: FreshnessPolicy) -> Self {
        Self { policy }
    }

    pub fn required_records(&self, horizons: &[Horizon]) -> usize {
        self.policy.min_consecutive_records.unwrap_or_else(|| {
            horizons.iter().map(|h| h.hours() as usize).max().unwrap_or(0) + 1
        })
    }

    /// Record count is checked before staleness
    pub fn verify(&self, dataset: &CanonicalDataset, horizons: &[Horizon], now: DateTime<Utc>) -> Readiness {
        let required = self.required_records(horizons);
        let available = longest_hourly_run(dataset);

        if available < required {
            warn!(
                "FreshnessVerifier: only {} consecutive hourly records, {} required",
                available, required
            );
            return Readiness::NotReady {
                reason: ReadinessError::InsufficientRecords { available, required },
            };
        }

        let Some(latest) = dataset.latest_timestamp() else {
            return Readiness::NotReady {
                reason: ReadinessError::InsufficientRecords { available: 0, required },
            };
        };

        let age = now - latest;
        let age_hours = age.num_seconds() as f64 / 3600.0;
        if age > self.policy.max_staleness {
            warn!(
                "FreshnessVerifier: newest record {} is {:.1}h old (limit {}h)",
                latest,
                age_hours,
                self.policy.max_staleness.num_hours()
            );
            return Readiness::NotReady {
                reason: ReadinessError::Stale {
                    age_hours,
                    max_hours: self.policy.max_staleness.num_hours(),
                },
            };
        }

        info!(
            "FreshnessVerifier: ready ({} consecutive hourly records, newest {:.1}h old)",
            available, age_hours
        );
        Readiness::Ready {
            longest_run: available,
            age_hours,
        }
    }
}

/// Longest stretch of records exactly one hour apart, over all entities
pub fn longest_hourly_run(dataset: &CanonicalDataset) -> usize {
    let step = Duration::hours(1);
    let mut best = 0;

    for entity in dataset.entities() {
        let mut run = 0;
        let mut previous: Option<DateTime<Utc>> = None;
        for record in dataset.entity_records(&entity) {
            run = match previous {
                Some(prev) if record.timestamp - prev == step => run + 1,
                _ => 1,
            };
            best = best.max(run);
            previous = Some(record.timestamp);
        }
    }

    best
}
