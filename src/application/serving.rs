//! Read-only view for the serving layer. Never mutates pipeline state.

use crate::application::ml::algorithms::load_artifact;
use crate::application::sync::materializer::SnapshotHandle;
use crate::domain::features::FeatureRecord;
use crate::domain::ml::feature_registry::features_to_vector;
use crate::domain::ml::{DeployedModel, Horizon};
use crate::domain::repositories::ModelRegistry;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct Prediction {
    pub entity_id: String,
    pub horizon: Horizon,
    /// Observation time of the features used
    pub as_of: DateTime<Utc>,
    pub target_time: DateTime<Utc>,
    pub aqi: f64,
    pub model_version: u64,
    pub algorithm: String,
}

pub struct ServingView {
    snapshot: SnapshotHandle,
    registry: Arc<dyn ModelRegistry>,
}

impl ServingView {
    pub fn new(snapshot: SnapshotHandle, registry: Arc<dyn ModelRegistry>) -> Self {
        Self { snapshot, registry }
    }

    pub fn get_snapshot(&self, entity_id: &str) -> Option<FeatureRecord> {
        // Clone the Arc so the read lock is released before the lookup
        let snapshot = self.snapshot.read().clone();
        snapshot.get(entity_id).cloned()
    }

    pub async fn get_active_model(&self, horizon: Horizon) -> Result<Option<DeployedModel>> {
        self.registry.get_active(horizon).await
    }

    pub async fn predict(&self, entity_id: &str, horizon: Horizon) -> Result<Prediction> {
        let record = self
            .get_snapshot(entity_id)
            .with_context(|| format!("No online features for entity '{}'", entity_id))?;
        let deployed = self
            .get_active_model(horizon)
            .await?
            .with_context(|| format!("No deployed model for horizon {}", horizon))?;

        let model = load_artifact(&deployed.candidate.artifact)?;
        let predictions = model.predict(&[features_to_vector(&record)])?;
        let aqi = predictions
            .first()
            .copied()
            .context("Model returned no prediction")?;

        Ok(Prediction {
            entity_id: entity_id.to_string(),
            horizon,
            as_of: record.timestamp,
            target_time: record.timestamp + horizon.duration(),
            aqi,
            model_version: deployed.version,
            algorithm: deployed.candidate.algorithm.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ml::algorithms::{AlgorithmKind, AlgorithmSettings, SmartcoreRegressor};
    use crate::application::promotion::gate::PromotionGate;
    use crate::domain::features::{OnlineSnapshot, RawFeatureRecord};
    use crate::domain::ml::{EvaluationMetrics, ModelCandidate, TrainingWindow};
    use crate::domain::ports::Regressor;
    use crate::infrastructure::repositories::InMemoryModelRegistry;
    use parking_lot::RwLock;

    fn snapshot_with(entity: &str) -> SnapshotHandle {
        let raw = RawFeatureRecord {
            entity_id: Some(entity.to_string()),
            timestamp: Some("2024-03-02 12:00:00".to_string()),
            aqi: Some(120.0),
            temp: Some(22.0),
            ..Default::default()
        };
        let mut snapshot = OnlineSnapshot {
            generation: 1,
            ..Default::default()
        };
        snapshot
            .entries
            .insert(entity.to_string(), FeatureRecord::from_raw(&raw, 1).unwrap());
        Arc::new(RwLock::new(Arc::new(snapshot)))
    }

    async fn deploy_baseline(registry: Arc<InMemoryModelRegistry>, horizon: Horizon, level: f64) {
        let regressor = SmartcoreRegressor::new(AlgorithmKind::MeanBaseline, AlgorithmSettings::default());
        let x = vec![vec![1.0; 10]; 4];
        let y = vec![level; 4];
        let artifact = regressor.fit(&x, &y).unwrap().to_artifact().unwrap();
        let now = Utc::now();
        let candidate = ModelCandidate {
            horizon,
            algorithm: regressor.tag(),
            artifact,
            metrics: EvaluationMetrics {
                mae: 1.0,
                rmse: 1.0,
                r2: 0.0,
                mape: None,
                mape_excluded: 0,
                n_test: 2,
            },
            window: TrainingWindow {
                start: now,
                end: now,
                n_train: 4,
                n_test: 2,
            },
            trained_at: now,
        };
        PromotionGate::new(registry).evaluate(&candidate, now).await.unwrap();
    }

    #[tokio::test]
    async fn test_predict_uses_active_model_and_snapshot() {
        let registry = Arc::new(InMemoryModelRegistry::new());
        deploy_baseline(registry.clone(), Horizon(24), 95.0).await;
        let view = ServingView::new(snapshot_with("lahore"), registry);

        let prediction = view.predict("lahore", Horizon(24)).await.unwrap();

        assert!((prediction.aqi - 95.0).abs() < 1e-9);
        assert_eq!(prediction.model_version, 1);
        assert_eq!(prediction.target_time - prediction.as_of, Horizon(24).duration());
    }

    #[tokio::test]
    async fn test_missing_entity_or_model_is_an_error() {
        let registry = Arc::new(InMemoryModelRegistry::new());
        let view = ServingView::new(snapshot_with("lahore"), registry.clone());

        assert!(view.get_snapshot("quetta").is_none());
        assert!(view.predict("lahore", Horizon(24)).await.is_err());

        deploy_baseline(registry, Horizon(24), 95.0).await;
        assert!(view.predict("quetta", Horizon(24)).await.is_err());
    }

    #[tokio::test]
    async fn test_serving_features_match_training_features() {
        use crate::application::sync::materializer::{MaterializationEngine, MaterializationScope};
        use crate::domain::features::CanonicalDataset;
        use crate::domain::ml::feature_registry::ForwardFill;

        let reading = |ts: &str, temp: Option<f64>| {
            let raw = RawFeatureRecord {
                entity_id: Some("isb".to_string()),
                timestamp: Some(ts.to_string()),
                aqi: Some(110.0),
                temp,
                ..Default::default()
            };
            FeatureRecord::from_raw(&raw, 1).unwrap()
        };
        let dataset = CanonicalDataset::from_records(vec![
            reading("2024-03-02 10:00:00", Some(31.5)),
            reading("2024-03-02 11:00:00", None),
        ]);
        let snapshot = MaterializationEngine::build(&dataset, &MaterializationScope::all(), 1, Utc::now());
        let view = ServingView::new(
            Arc::new(RwLock::new(Arc::new(snapshot))),
            Arc::new(InMemoryModelRegistry::new()),
        );

        let mut fill = ForwardFill::default();
        let training_rows: Vec<Vec<f64>> = dataset.entity_records("isb").map(|r| fill.fill(r)).collect();
        let served = features_to_vector(&view.get_snapshot("isb").unwrap());

        assert_eq!(served[4], 31.5);
        assert_eq!(&served, training_rows.last().unwrap());
    }
}
