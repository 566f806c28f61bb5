use crate::domain::errors::TrainingError;
use crate::domain::ml::{AlgorithmTag, ModelArtifact};
use crate::domain::ports::{FittedModel, Regressor};
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::linear::linear_regression::{
    LinearRegression, LinearRegressionParameters, LinearRegressionSolverName,
};
use smartcore::linear::ridge_regression::{RidgeRegression, RidgeRegressionParameters};
use statrs::statistics::{Data, Distribution};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

type Matrix = DenseMatrix<f64>;
type LinearModel = LinearRegression<f64, f64, Matrix, Vec<f64>>;
type RidgeModel = RidgeRegression<f64, f64, Matrix, Vec<f64>>;
type ForestModel = RandomForestRegressor<f64, f64, Matrix, Vec<f64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmKind {
    LinearRegression,
    RidgeRegression,
    RandomForest,
    MeanBaseline,
}

impl AlgorithmKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmKind::LinearRegression => "linear_regression",
            AlgorithmKind::RidgeRegression => "ridge_regression",
            AlgorithmKind::RandomForest => "random_forest",
            AlgorithmKind::MeanBaseline => "mean_baseline",
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlgorithmKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "linear_regression" | "linear" => Ok(AlgorithmKind::LinearRegression),
            "ridge_regression" | "ridge" => Ok(AlgorithmKind::RidgeRegression),
            "random_forest" | "rf" => Ok(AlgorithmKind::RandomForest),
            "mean_baseline" | "baseline" => Ok(AlgorithmKind::MeanBaseline),
            _ => anyhow::bail!(
                "Unknown algorithm family: {}. Must be one of linear_regression, ridge_regression, random_forest, mean_baseline",
                s
            ),
        }
    }
}

/// Hyperparameters shared by all families
#[derive(Debug, Clone)]
pub struct AlgorithmSettings {
    pub rf_n_trees: usize,
    pub rf_max_depth: u16,
    pub ridge_alpha: f64,
}

impl Default for AlgorithmSettings {
    fn default() -> Self {
        Self {
            rf_n_trees: 50,
            rf_max_depth: 5,
            ridge_alpha: 1.0,
        }
    }
}

/// Per-column z-score scaling fitted on the training split.
/// Zero-variance columns are dropped; they carry no signal and make
/// the linear solvers singular.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Standardizer {
    mean: Vec<f64>,
    std: Vec<f64>,
    keep: Vec<bool>,
}

impl Standardizer {
    fn fit(x: &[Vec<f64>]) -> Self {
        let width = x.first().map(Vec::len).unwrap_or(0);
        let mut mean = Vec::with_capacity(width);
        let mut std = Vec::with_capacity(width);
        let mut keep = Vec::with_capacity(width);

        for col in 0..width {
            let data = Data::new(x.iter().map(|row| row[col]).collect::<Vec<f64>>());
            let m = data.mean().unwrap_or(0.0);
            let s = data.std_dev().unwrap_or(0.0);
            let informative = s.is_finite() && s > 1e-12;
            mean.push(m);
            std.push(if informative { s } else { 1.0 });
            keep.push(informative);
        }

        Self { mean, std, keep }
    }

    fn kept_columns(&self) -> usize {
        self.keep.iter().filter(|k| **k).count()
    }

    fn transform(&self, x: &[Vec<f64>]) -> Vec<Vec<f64>> {
        x.iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .filter(|(i, _)| self.keep.get(*i).copied().unwrap_or(false))
                    .map(|(i, v)| (v - self.mean[i]) / self.std[i])
                    .collect()
            })
            .collect()
    }
}

/// Serialized form of every fitted family
#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Payload {
    LinearRegression { scaler: Standardizer, model: LinearModel },
    RidgeRegression { scaler: Standardizer, model: RidgeModel },
    RandomForest { model: ForestModel },
    MeanBaseline { mean: f64 },
}

fn to_matrix(x: &[Vec<f64>], tag: &str) -> Result<Matrix, TrainingError> {
    DenseMatrix::from_2d_vec(&x.to_vec())
        .map_err(|e| TrainingError::convergence(tag, format!("Matrix error: {}", e)))
}

pub struct SmartcoreRegressor {
    kind: AlgorithmKind,
    settings: AlgorithmSettings,
}

impl SmartcoreRegressor {
    pub fn new(kind: AlgorithmKind, settings: AlgorithmSettings) -> Self {
        Self { kind, settings }
    }

    fn fit_payload(&self, x: &[Vec<f64>], y: &[f64]) -> Result<Payload, TrainingError> {
        let tag = self.kind.as_str();
        if x.is_empty() || x.len() != y.len() {
            return Err(TrainingError::convergence(
                tag,
                format!("{} feature rows for {} targets", x.len(), y.len()),
            ));
        }

        match self.kind {
            AlgorithmKind::LinearRegression | AlgorithmKind::RidgeRegression => {
                let scaler = Standardizer::fit(x);
                if scaler.kept_columns() == 0 {
                    return Err(TrainingError::convergence(tag, "every feature is constant"));
                }
                let matrix = to_matrix(&scaler.transform(x), tag)?;
                let y = y.to_vec();

                if self.kind == AlgorithmKind::LinearRegression {
                    let params = LinearRegressionParameters::default()
                        .with_solver(LinearRegressionSolverName::SVD);
                    let model = LinearRegression::fit(&matrix, &y, params)
                        .map_err(|e| TrainingError::convergence(tag, e))?;
                    Ok(Payload::LinearRegression { scaler, model })
                } else {
                    let params = RidgeRegressionParameters::default().with_alpha(self.settings.ridge_alpha);
                    let model = RidgeRegression::fit(&matrix, &y, params)
                        .map_err(|e| TrainingError::convergence(tag, e))?;
                    Ok(Payload::RidgeRegression { scaler, model })
                }
            }
            AlgorithmKind::RandomForest => {
                let matrix = to_matrix(x, tag)?;
                let params = RandomForestRegressorParameters::default()
                    .with_n_trees(self.settings.rf_n_trees)
                    .with_max_depth(self.settings.rf_max_depth);
                let model = RandomForestRegressor::fit(&matrix, &y.to_vec(), params)
                    .map_err(|e| TrainingError::convergence(tag, e))?;
                Ok(Payload::RandomForest { model })
            }
            AlgorithmKind::MeanBaseline => {
                let mean = Data::new(y.to_vec())
                    .mean()
                    .filter(|m| m.is_finite())
                    .ok_or_else(|| TrainingError::convergence(tag, "target mean is undefined"))?;
                Ok(Payload::MeanBaseline { mean })
            }
        }
    }
}

impl Regressor for SmartcoreRegressor {
    fn tag(&self) -> AlgorithmTag {
        AlgorithmTag::new(self.kind.as_str())
    }

    fn fit(&self, x: &[Vec<f64>], y: &[f64]) -> Result<Box<dyn FittedModel>, TrainingError> {
        let payload = self.fit_payload(x, y)?;
        Ok(Box::new(FittedRegressor {
            tag: self.tag(),
            payload,
        }))
    }
}

struct FittedRegressor {
    tag: AlgorithmTag,
    payload: Payload,
}

impl FittedModel for FittedRegressor {
    fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, TrainingError> {
        let tag = self.tag.as_str();
        if x.is_empty() {
            return Ok(Vec::new());
        }

        match &self.payload {
            Payload::LinearRegression { scaler, model } => model
                .predict(&to_matrix(&scaler.transform(x), tag)?)
                .map_err(|e| TrainingError::convergence(tag, format!("Predict error: {}", e))),
            Payload::RidgeRegression { scaler, model } => model
                .predict(&to_matrix(&scaler.transform(x), tag)?)
                .map_err(|e| TrainingError::convergence(tag, format!("Predict error: {}", e))),
            Payload::RandomForest { model } => model
                .predict(&to_matrix(x, tag)?)
                .map_err(|e| TrainingError::convergence(tag, format!("Predict error: {}", e))),
            Payload::MeanBaseline { mean } => Ok(vec![*mean; x.len()]),
        }
    }

    fn to_artifact(&self) -> Result<ModelArtifact, TrainingError> {
        let payload = serde_json::to_string(&self.payload)
            .map_err(|e| TrainingError::convergence(self.tag.as_str(), format!("Serialize error: {}", e)))?;
        Ok(ModelArtifact {
            algorithm: self.tag.clone(),
            payload,
        })
    }
}

/// Rebuild a fitted model from a stored artifact
pub fn load_artifact(artifact: &ModelArtifact) -> Result<Box<dyn FittedModel>, TrainingError> {
    let tag = artifact.algorithm.as_str();
    let payload: Payload = serde_json::from_str(&artifact.payload)
        .map_err(|e| TrainingError::convergence(tag, format!("Deserialize error: {}", e)))?;
    Ok(Box::new(FittedRegressor {
        tag: artifact.algorithm.clone(),
        payload,
    }))
}

/// Parse a list of family names into regressors, rejecting unknown names
pub fn build_regressors(
    families: &[String],
    settings: &AlgorithmSettings,
) -> anyhow::Result<Vec<Arc<dyn Regressor>>> {
    let mut regressors: Vec<Arc<dyn Regressor>> = Vec::new();
    let mut seen = Vec::new();
    for name in families {
        let kind = AlgorithmKind::from_str(name)?;
        if seen.contains(&kind) {
            continue;
        }
        seen.push(kind);
        regressors.push(Arc::new(SmartcoreRegressor::new(kind, settings.clone())));
    }
    if regressors.is_empty() {
        anyhow::bail!("At least one algorithm family is required");
    }
    Ok(regressors)
}
