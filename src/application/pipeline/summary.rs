use crate::application::ml::dataset::SkippedHorizon;
use crate::application::ml::trainer::HorizonTraining;
use crate::application::sync::merger::MergeReport;
use crate::domain::errors::PipelineError;
use crate::domain::ml::{Horizon, ModelCandidate, PromotionDecision};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Final state of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Ran through promotion
    Completed,
    /// Data synced, training deferred by the readiness gate
    NotReady,
    Failed { stage: String, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateSummary {
    pub algorithm: String,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
    pub mape: Option<f64>,
    pub mape_excluded: usize,
}

impl From<&ModelCandidate> for CandidateSummary {
    fn from(c: &ModelCandidate) -> Self {
        Self {
            algorithm: c.algorithm.to_string(),
            rmse: c.metrics.rmse,
            mae: c.metrics.mae,
            r2: c.metrics.r2,
            mape: c.metrics.mape,
            mape_excluded: c.metrics.mape_excluded,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureSummary {
    pub algorithm: String,
    pub error: String,
}

/// Per-horizon line of a run summary. Skipped horizons carry the sample
/// counts that made them untrainable.
#[derive(Debug, Clone, Serialize)]
pub struct HorizonSummary {
    pub horizon: Horizon,
    pub total_samples: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub candidates: Vec<CandidateSummary>,
    pub failures: Vec<FailureSummary>,
    pub cancelled: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkippedHorizon>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<PromotionDecision>,
}

impl HorizonSummary {
    pub fn trained(training: &HorizonTraining) -> Self {
        Self {
            horizon: training.horizon,
            total_samples: training.total_samples,
            n_train: training.n_train,
            n_test: training.n_test,
            candidates: training.candidates.iter().map(CandidateSummary::from).collect(),
            failures: training
                .failures
                .iter()
                .map(|(tag, err)| FailureSummary {
                    algorithm: tag.to_string(),
                    error: err.to_string(),
                })
                .collect(),
            cancelled: training.cancelled,
            skipped: None,
            version: None,
            decision: None,
        }
    }

    pub fn skipped(skipped: &SkippedHorizon) -> Self {
        Self {
            horizon: skipped.horizon,
            total_samples: skipped.available_samples,
            n_train: 0,
            n_test: 0,
            candidates: Vec::new(),
            failures: Vec::new(),
            cancelled: 0,
            skipped: Some(skipped.clone()),
            version: None,
            decision: None,
        }
    }

    pub fn promoted(&self) -> bool {
        self.decision.as_ref().is_some_and(|d| d.promoted)
    }
}

/// Structured record of one pipeline invocation, emitted win or lose
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Upstream run that was merged, if any bundle was found
    pub fetched_run: Option<u64>,
    pub merge: Option<MergeReport>,
    pub snapshot_generation: Option<u64>,
    pub readiness: Option<String>,
    pub horizons: Vec<HorizonSummary>,
    pub outcome: RunOutcome,
}

impl RunSummary {
    pub fn start(now: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: now,
            finished_at: None,
            fetched_run: None,
            merge: None,
            snapshot_generation: None,
            readiness: None,
            horizons: Vec::new(),
            outcome: RunOutcome::Completed,
        }
    }

    pub fn fail(&mut self, err: &PipelineError) {
        self.outcome = RunOutcome::Failed {
            stage: err.stage().to_string(),
            error: err.to_string(),
        };
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, RunOutcome::Failed { .. })
    }

    pub fn records_merged(&self) -> usize {
        self.merge.as_ref().map_or(0, |m| m.added)
    }

    pub fn duplicates_resolved(&self) -> usize {
        self.merge.as_ref().map_or(0, |m| m.duplicates_resolved)
    }

    pub fn rejected(&self) -> usize {
        self.merge.as_ref().map_or(0, |m| m.rejected)
    }

    pub fn horizon(&self, horizon: Horizon) -> Option<&HorizonSummary> {
        self.horizons.iter().find(|h| h.horizon == horizon)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("{{\"error\":\"unserializable summary: {}\"}}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::FetchError;

    #[test]
    fn test_failed_run_serializes_stage() {
        let mut summary = RunSummary::start(Utc::now());
        summary.fail(&PipelineError::from(FetchError::transport("connection refused")));

        assert!(summary.is_failure());
        let json: serde_json::Value = serde_json::from_str(&summary.to_json()).unwrap();
        assert_eq!(json["outcome"]["status"], "failed");
        assert_eq!(json["outcome"]["stage"], "fetch");
        assert_eq!(summary.records_merged(), 0);
    }

    #[test]
    fn test_skipped_horizon_reports_counts() {
        let skipped = SkippedHorizon {
            horizon: Horizon(72),
            available_samples: 4,
            reason: "need at least 5 train / 2 test samples".to_string(),
            recommended_span_hours: 82,
        };
        let line = HorizonSummary::skipped(&skipped);

        assert_eq!(line.total_samples, 4);
        assert!(!line.promoted());
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["skipped"]["recommended_span_hours"], 82);
        assert!(json.get("decision").is_none());
    }
}
