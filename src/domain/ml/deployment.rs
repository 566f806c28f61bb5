use super::candidate::ModelCandidate;
use super::horizon::Horizon;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The model currently serving a horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployedModel {
    pub version: u64,
    pub promoted_at: DateTime<Utc>,
    pub candidate: ModelCandidate,
}

impl DeployedModel {
    pub fn horizon(&self) -> Horizon {
        self.candidate.horizon
    }

    pub fn rmse(&self) -> f64 {
        self.candidate.metrics.rmse
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// Empty deployment slot, the first candidate is always promoted
    NoIncumbent,
    /// Candidate RMSE strictly below the incumbent's
    Improved,
    /// Candidate RMSE equal to or above the incumbent's
    NotImproved,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DecisionReason::NoIncumbent => "no_incumbent",
            DecisionReason::Improved => "improved",
            DecisionReason::NotImproved => "not_improved",
        };
        f.write_str(label)
    }
}

impl FromStr for DecisionReason {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no_incumbent" => Ok(DecisionReason::NoIncumbent),
            "improved" => Ok(DecisionReason::Improved),
            "not_improved" => Ok(DecisionReason::NotImproved),
            other => anyhow::bail!("Unknown decision reason '{}'", other),
        }
    }
}

/// Outcome of comparing a candidate with the incumbent. Recorded win or lose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionDecision {
    pub horizon: Horizon,
    pub promoted: bool,
    pub reason: DecisionReason,
    pub candidate_rmse: f64,
    pub incumbent_version: Option<u64>,
    pub incumbent_rmse: Option<f64>,
    pub decided_at: DateTime<Utc>,
}

/// One appended registry version with its decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub version: u64,
    pub candidate: ModelCandidate,
    pub decision: PromotionDecision,
    /// Whether this version was ever deployed
    pub deployed: bool,
}
