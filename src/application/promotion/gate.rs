use crate::domain::errors::PromotionError;
use crate::domain::ml::{DecisionReason, DeployedModel, ModelCandidate, PromotionDecision};
use crate::domain::repositories::ModelRegistry;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// A recorded decision and the registry version it was stored under
#[derive(Debug, Clone, Serialize)]
pub struct PromotionOutcome {
    pub version: u64,
    pub decision: PromotionDecision,
}

/// Decides whether a horizon's best candidate replaces the deployed model.
///
/// Promotion requires strictly lower holdout RMSE than the incumbent; an
/// empty slot always accepts the first candidate.
pub struct PromotionGate {
    registry: Arc<dyn ModelRegistry>,
}

impl PromotionGate {
    pub fn new(registry: Arc<dyn ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn decide(
        candidate: &ModelCandidate,
        incumbent: Option<&DeployedModel>,
        now: DateTime<Utc>,
    ) -> PromotionDecision {
        let (promoted, reason) = match incumbent {
            None => (true, DecisionReason::NoIncumbent),
            Some(active) if candidate.metrics.rmse < active.rmse() => (true, DecisionReason::Improved),
            Some(_) => (false, DecisionReason::NotImproved),
        };

        PromotionDecision {
            horizon: candidate.horizon,
            promoted,
            reason,
            candidate_rmse: candidate.metrics.rmse,
            incumbent_version: incumbent.map(|m| m.version),
            incumbent_rmse: incumbent.map(|m| m.rmse()),
            decided_at: now,
        }
    }

    /// Compare against the active model and record the decision, win or lose
    pub async fn evaluate(
        &self,
        candidate: &ModelCandidate,
        now: DateTime<Utc>,
    ) -> Result<PromotionOutcome, PromotionError> {
        let horizon = candidate.horizon;
        let write_failure = |e: anyhow::Error| PromotionError::RegistryWriteFailure {
            horizon: horizon.to_string(),
            reason: format!("{:#}", e),
        };

        let incumbent = self.registry.get_active(horizon).await.map_err(write_failure)?;
        let decision = Self::decide(candidate, incumbent.as_ref(), now);
        let version = self
            .registry
            .append(candidate, &decision)
            .await
            .map_err(write_failure)?;

        match &incumbent {
            Some(active) => info!(
                "PromotionGate: {} {} v{} RMSE={:.4} vs incumbent v{} RMSE={:.4} -> {} ({})",
                horizon,
                candidate.algorithm,
                version,
                decision.candidate_rmse,
                active.version,
                active.rmse(),
                if decision.promoted { "promoted" } else { "kept incumbent" },
                decision.reason
            ),
            None => info!(
                "PromotionGate: {} {} v{} RMSE={:.4} deployed into empty slot",
                horizon, candidate.algorithm, version, decision.candidate_rmse
            ),
        }

        Ok(PromotionOutcome { version, decision })
    }
}
