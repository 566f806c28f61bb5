use super::dataset::{HorizonDataset, SkippedHorizon, SplitPolicy, SupervisedSet, build_horizon_dataset};
use super::evaluator::Evaluator;
use crate::domain::errors::TrainingError;
use crate::domain::features::CanonicalDataset;
use crate::domain::ml::{AlgorithmTag, Horizon, ModelCandidate};
use crate::domain::ports::Regressor;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Result of one (horizon, algorithm) unit
#[derive(Debug, Clone)]
pub enum UnitResult {
    Trained(ModelCandidate),
    Failed {
        horizon: Horizon,
        algorithm: AlgorithmTag,
        error: TrainingError,
    },
    Cancelled {
        horizon: Horizon,
        algorithm: AlgorithmTag,
    },
}

impl UnitResult {
    fn horizon(&self) -> Horizon {
        match self {
            UnitResult::Trained(candidate) => candidate.horizon,
            UnitResult::Failed { horizon, .. } | UnitResult::Cancelled { horizon, .. } => *horizon,
        }
    }
}

/// Everything trained for one horizon, best candidate first
#[derive(Debug, Clone)]
pub struct HorizonTraining {
    pub horizon: Horizon,
    pub total_samples: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub candidates: Vec<ModelCandidate>,
    pub failures: Vec<(AlgorithmTag, TrainingError)>,
    pub cancelled: usize,
}

impl HorizonTraining {
    pub fn best(&self) -> Option<&ModelCandidate> {
        self.candidates.first()
    }
}

#[derive(Debug, Clone)]
pub enum HorizonOutcome {
    Trained(HorizonTraining),
    Skipped(SkippedHorizon),
}

impl HorizonOutcome {
    pub fn horizon(&self) -> Horizon {
        match self {
            HorizonOutcome::Trained(t) => t.horizon,
            HorizonOutcome::Skipped(s) => s.horizon,
        }
    }
}

/// Trains every configured family for every horizon on a bounded worker
/// pool. Units share nothing mutable; a failing unit only removes itself
/// from ranking. Cancellation is honoured between units, never mid-fit.
pub struct MultiHorizonTrainer {
    regressors: Vec<Arc<dyn Regressor>>,
    split: SplitPolicy,
    pool: rayon::ThreadPool,
    cancel: Arc<AtomicBool>,
}

impl MultiHorizonTrainer {
    pub fn new(regressors: Vec<Arc<dyn Regressor>>, split: SplitPolicy, workers: usize) -> anyhow::Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("trainer-{}", i))
            .build()?;
        Ok(Self {
            regressors,
            split,
            pool,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Setting the returned flag stops the trainer before its next unit
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn train_all(
        &self,
        dataset: &CanonicalDataset,
        horizons: &[Horizon],
        now: DateTime<Utc>,
    ) -> Vec<HorizonOutcome> {
        let mut outcomes = Vec::with_capacity(horizons.len());
        let mut sets: Vec<Arc<SupervisedSet>> = Vec::new();

        for horizon in horizons {
            match build_horizon_dataset(dataset, *horizon, &self.split) {
                HorizonDataset::Trainable(set) => sets.push(Arc::new(set)),
                HorizonDataset::Skipped(skipped) => outcomes.push(HorizonOutcome::Skipped(skipped)),
            }
        }

        let units: Vec<(Arc<SupervisedSet>, Arc<dyn Regressor>)> = sets
            .iter()
            .flat_map(|set| self.regressors.iter().map(move |r| (set.clone(), r.clone())))
            .collect();

        info!(
            "MultiHorizonTrainer: {} units across {} horizons ({} skipped)",
            units.len(),
            sets.len(),
            outcomes.len()
        );

        let results: Vec<UnitResult> = self.pool.install(|| {
            units
                .par_iter()
                .map(|(set, regressor)| self.run_unit(set, regressor.as_ref(), now))
                .collect()
        });

        for set in &sets {
            let mut training = HorizonTraining {
                horizon: set.horizon,
                total_samples: set.total_samples(),
                n_train: set.window.n_train,
                n_test: set.window.n_test,
                candidates: Vec::new(),
                failures: Vec::new(),
                cancelled: 0,
            };
            for result in results.iter().filter(|r| r.horizon() == set.horizon) {
                match result {
                    UnitResult::Trained(candidate) => training.candidates.push(candidate.clone()),
                    UnitResult::Failed { algorithm, error, .. } => {
                        training.failures.push((algorithm.clone(), error.clone()))
                    }
                    UnitResult::Cancelled { .. } => training.cancelled += 1,
                }
            }
            Evaluator::rank(&mut training.candidates);
            outcomes.push(HorizonOutcome::Trained(training));
        }

        outcomes.sort_by_key(|o| o.horizon());
        outcomes
    }

    fn run_unit(&self, set: &SupervisedSet, regressor: &dyn Regressor, now: DateTime<Utc>) -> UnitResult {
        let horizon = set.horizon;
        let algorithm = regressor.tag();

        if self.cancel.load(Ordering::SeqCst) {
            return UnitResult::Cancelled { horizon, algorithm };
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| train_candidate(set, regressor, now)))
            .unwrap_or_else(|_| Err(TrainingError::convergence(algorithm.as_str(), "training panicked")));

        match outcome {
            Ok(candidate) => {
                info!(
                    "MultiHorizonTrainer: {} {} -> RMSE={:.4}, MAE={:.4}, R²={:.4}",
                    horizon, algorithm, candidate.metrics.rmse, candidate.metrics.mae, candidate.metrics.r2
                );
                UnitResult::Trained(candidate)
            }
            Err(error) => {
                warn!("MultiHorizonTrainer: {} {} excluded: {}", horizon, algorithm, error);
                UnitResult::Failed {
                    horizon,
                    algorithm,
                    error,
                }
            }
        }
    }
}

fn train_candidate(
    set: &SupervisedSet,
    regressor: &dyn Regressor,
    now: DateTime<Utc>,
) -> Result<ModelCandidate, TrainingError> {
    let algorithm = regressor.tag();
    let model = regressor.fit(&set.x_train, &set.y_train)?;
    let predictions = model.predict(&set.x_test)?;
    let metrics = Evaluator::evaluate(algorithm.as_str(), &predictions, &set.y_test)?;
    let artifact = model.to_artifact()?;

    Ok(ModelCandidate {
        horizon: set.horizon,
        algorithm,
        artifact,
        metrics,
        window: set.window.clone(),
        trained_at: now,
    })
}
