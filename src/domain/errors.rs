use thiserror::Error;

/// Errors raised while locating or downloading an artifact bundle
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("No artifact bundle found: {reason}")]
    NotFound { reason: String },

    #[error("Artifact transport failed after {attempts} attempt(s): {reason}")]
    TransportFailure { attempts: u32, reason: String },
}

impl FetchError {
    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::NotFound {
            reason: reason.into(),
        }
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::TransportFailure {
            attempts: 1,
            reason: reason.into(),
        }
    }

    /// Only transport failures are worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransportFailure { .. })
    }
}

/// Errors related to merging staged records into the canonical dataset
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MergeError {
    #[error("Invalid record ({key}): {reason}")]
    InvalidRecord { key: String, reason: String },

    #[error("Schema mismatch: {reason}")]
    SchemaMismatch { reason: String },
}

/// Errors raised while projecting the online snapshot
#[derive(Debug, Error)]
pub enum MaterializationError {
    #[error("Snapshot write failed: {reason}")]
    WriteFailure { reason: String },
}

/// Reasons the dataset is not ready for training. Not fatal: the cycle is skipped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadinessError {
    #[error("Insufficient records: longest consecutive hourly run is {available}, need {required}")]
    InsufficientRecords { available: usize, required: usize },

    #[error("Dataset is stale: newest record is {age_hours:.1}h old (limit {max_hours}h)")]
    Stale { age_hours: f64, max_hours: i64 },
}

/// Errors isolated to a single (horizon, algorithm) training unit
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrainingError {
    #[error("{algorithm} failed to converge: {reason}")]
    ConvergenceFailure { algorithm: String, reason: String },

    #[error("Insufficient data: {train} train / {test} test samples (need {min_train} / {min_test})")]
    InsufficientData {
        train: usize,
        test: usize,
        min_train: usize,
        min_test: usize,
    },
}

impl TrainingError {
    pub fn convergence(algorithm: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::ConvergenceFailure {
            algorithm: algorithm.into(),
            reason: reason.to_string(),
        }
    }
}

/// Errors raised while recording a promotion decision
#[derive(Debug, Error)]
pub enum PromotionError {
    #[error("Registry write failed for horizon {horizon}: {reason}")]
    RegistryWriteFailure { horizon: String, reason: String },
}

/// Unrecoverable stage failures that halt a pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetch stage failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("merge stage failed: {0}")]
    Merge(#[from] MergeError),

    #[error("materialization stage failed: {0}")]
    Materialization(#[from] MaterializationError),

    #[error("training stage aborted: {0}")]
    TrainingAborted(String),

    #[error("promotion stage failed: {0}")]
    Promotion(#[from] PromotionError),

    #[error("storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl PipelineError {
    /// Stage label used in run summaries and metrics
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Fetch(_) => "fetch",
            PipelineError::Merge(_) => "merge",
            PipelineError::Materialization(_) => "materialize",
            PipelineError::TrainingAborted(_) => "train",
            PipelineError::Promotion(_) => "promote",
            PipelineError::Storage(_) => "storage",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_error_formatting() {
        let err = ReadinessError::Stale {
            age_hours: 30.25,
            max_hours: 25,
        };

        let msg = err.to_string();
        assert!(msg.contains("30.2"));
        assert!(msg.contains("25h"));
    }

    #[test]
    fn test_only_transport_failures_are_transient() {
        assert!(FetchError::transport("connection reset").is_transient());
        assert!(!FetchError::not_found("no runs").is_transient());
    }

    #[test]
    fn test_stage_errors_convert_into_pipeline_error() {
        let err: PipelineError = MergeError::SchemaMismatch {
            reason: "bundle declares 3 records, contains 2".to_string(),
        }
        .into();
        assert!(err.to_string().starts_with("merge stage failed"));
    }
}
