pub mod candidate;
pub mod deployment;
pub mod feature_registry;
pub mod horizon;

pub use candidate::{AlgorithmTag, EvaluationMetrics, ModelArtifact, ModelCandidate, TrainingWindow};
pub use deployment::{DecisionReason, DeployedModel, PromotionDecision, RegistryEntry};
pub use horizon::Horizon;
