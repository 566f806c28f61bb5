use crate::domain::errors::TrainingError;
use crate::domain::ml::{EvaluationMetrics, ModelCandidate};
use std::cmp::Ordering;

/// Holdout scoring. Non-finite predictions mean the model is unusable.
pub struct Evaluator;

impl Evaluator {
    pub fn evaluate(
        algorithm: &str,
        predictions: &[f64],
        actuals: &[f64],
    ) -> Result<EvaluationMetrics, TrainingError> {
        if predictions.len() != actuals.len() {
            return Err(TrainingError::convergence(
                algorithm,
                format!("{} predictions for {} actuals", predictions.len(), actuals.len()),
            ));
        }
        if predictions.is_empty() {
            return Err(TrainingError::convergence(algorithm, "empty holdout"));
        }
        if let Some(bad) = predictions.iter().find(|p| !p.is_finite()) {
            return Err(TrainingError::convergence(
                algorithm,
                format!("non-finite prediction {}", bad),
            ));
        }

        let n = predictions.len() as f64;
        let mut abs_sum = 0.0;
        let mut sq_sum = 0.0;
        let mut pct_sum = 0.0;
        let mut pct_count = 0usize;

        for (pred, actual) in predictions.iter().zip(actuals.iter()) {
            let err = pred - actual;
            abs_sum += err.abs();
            sq_sum += err * err;
            if *actual != 0.0 {
                pct_sum += (err / actual).abs();
                pct_count += 1;
            }
        }

        let mean_actual = actuals.iter().sum::<f64>() / n;
        let total_var: f64 = actuals.iter().map(|a| (a - mean_actual).powi(2)).sum();
        let r2 = if total_var > 0.0 {
            1.0 - sq_sum / total_var
        } else if sq_sum == 0.0 {
            1.0
        } else {
            0.0
        };

        Ok(EvaluationMetrics {
            mae: abs_sum / n,
            rmse: (sq_sum / n).sqrt(),
            r2,
            mape: (pct_count > 0).then(|| pct_sum / pct_count as f64 * 100.0),
            mape_excluded: predictions.len() - pct_count,
            n_test: predictions.len(),
        })
    }

    /// RMSE ascending, then MAE, then algorithm name for determinism
    pub fn compare(a: &ModelCandidate, b: &ModelCandidate) -> Ordering {
        a.metrics
            .rmse
            .total_cmp(&b.metrics.rmse)
            .then_with(|| a.metrics.mae.total_cmp(&b.metrics.mae))
            .then_with(|| a.algorithm.cmp(&b.algorithm))
    }

    pub fn rank(candidates: &mut [ModelCandidate]) {
        candidates.sort_by(Self::compare);
    }
}
