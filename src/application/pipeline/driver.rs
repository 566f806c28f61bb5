use super::summary::{HorizonSummary, RunOutcome, RunSummary};
use crate::application::ml::trainer::{HorizonOutcome, MultiHorizonTrainer};
use crate::application::promotion::gate::PromotionGate;
use crate::application::sync::fetcher::{ArtifactFetcher, SelectionPolicy, StagedBundle};
use crate::application::sync::freshness::{FreshnessVerifier, Readiness};
use crate::application::sync::materializer::{MaterializationEngine, MaterializationScope};
use crate::application::sync::merger::FeatureMerger;
use crate::domain::errors::{FetchError, PipelineError};
use crate::domain::features::CanonicalDataset;
use crate::domain::ml::Horizon;
use crate::domain::repositories::CanonicalStore;
use crate::infrastructure::observability::Metrics;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Per-invocation knobs
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub selection_policy: SelectionPolicy,
    pub lookback: chrono::Duration,
    pub horizons: Vec<Horizon>,
    pub scope: MaterializationScope,
}

/// Runs one sync → train → promote cycle. Stages run in order and each
/// gates the next; the first unrecoverable failure ends the run without
/// further durable writes.
pub struct PipelineDriver {
    fetcher: ArtifactFetcher,
    merger: FeatureMerger,
    canonical: Arc<dyn CanonicalStore>,
    materializer: Arc<MaterializationEngine>,
    verifier: FreshnessVerifier,
    trainer: Arc<MultiHorizonTrainer>,
    gate: PromotionGate,
    options: PipelineOptions,
    metrics: Option<Metrics>,
}

impl PipelineDriver {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fetcher: ArtifactFetcher,
        canonical: Arc<dyn CanonicalStore>,
        materializer: Arc<MaterializationEngine>,
        verifier: FreshnessVerifier,
        trainer: Arc<MultiHorizonTrainer>,
        gate: PromotionGate,
        options: PipelineOptions,
    ) -> Self {
        Self {
            fetcher,
            merger: FeatureMerger::new(),
            canonical,
            materializer,
            verifier,
            trainer,
            gate,
            options,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn options_mut(&mut self) -> &mut PipelineOptions {
        &mut self.options
    }

    pub fn trainer(&self) -> Arc<MultiHorizonTrainer> {
        self.trainer.clone()
    }

    /// Execute one cycle. The summary is always returned and logged;
    /// failures are reported through `RunOutcome::Failed`.
    pub async fn run(&self, now: DateTime<Utc>) -> RunSummary {
        let mut summary = RunSummary::start(now);
        info!("Pipeline run {} started", summary.run_id);

        if let Err(e) = self.execute(&mut summary, now).await {
            error!("Pipeline run {} halted in {} stage: {}", summary.run_id, e.stage(), e);
            summary.fail(&e);
        }
        summary.finished_at = Some(Utc::now());

        if let Some(metrics) = &self.metrics {
            let status = match &summary.outcome {
                RunOutcome::Completed => "completed",
                RunOutcome::NotReady => "not_ready",
                RunOutcome::Failed { .. } => "failed",
            };
            metrics.cycles_total.with_label_values(&[status]).inc();
        }

        info!(summary = %summary.to_json(), "Pipeline run {} finished", summary.run_id);
        summary
    }

    async fn execute(&self, summary: &mut RunSummary, now: DateTime<Utc>) -> Result<(), PipelineError> {
        // 1. Fetch
        let staged = match self
            .fetcher
            .fetch(&self.options.selection_policy, self.options.lookback, now)
            .await
        {
            Ok(staged) => Some(staged),
            Err(FetchError::NotFound { reason }) => {
                warn!("No bundle to merge this cycle ({}), continuing with the current dataset", reason);
                None
            }
            Err(e) => return Err(e.into()),
        };

        // 2. Merge
        let mut dataset = self.canonical.load()?;
        if let Some(staged) = staged {
            summary.fetched_run = Some(staged.bundle.run_id().0);
            dataset = self.merge(dataset, &staged, summary)?;
        }

        // 3. Materialize
        let snapshot = self.materializer.materialize(&dataset, &self.options.scope, now)?;
        summary.snapshot_generation = Some(snapshot.generation);
        if let Some(metrics) = &self.metrics {
            metrics.snapshot_generation.set(snapshot.generation as f64);
        }

        // 4. Readiness gate
        let readiness = self.verifier.verify(&dataset, &self.options.horizons, now);
        summary.readiness = Some(readiness.verdict());
        if let Readiness::NotReady { reason } = &readiness {
            info!("Training deferred: {}", reason);
            summary.outcome = RunOutcome::NotReady;
            return Ok(());
        }

        // 5. Train + evaluate
        let outcomes = self.train(dataset, now).await?;

        // 6. Promote
        for outcome in outcomes {
            let line = self.promote(outcome, now).await?;
            summary.horizons.push(line);
        }

        Ok(())
    }

    fn merge(
        &self,
        dataset: CanonicalDataset,
        staged: &StagedBundle,
        summary: &mut RunSummary,
    ) -> Result<CanonicalDataset, PipelineError> {
        let (merged, report) = self.merger.merge(&dataset, &staged.bundle)?;

        if report.changed() {
            self.canonical.commit(&merged)?;
        } else {
            info!("Merge of run {} changed nothing, canonical log left as is", report.run_id);
        }

        if let Some(metrics) = &self.metrics {
            metrics.records_merged_total.inc_by(report.added as u64);
            metrics.records_rejected_total.inc_by(report.rejected as u64);
            metrics.duplicates_resolved_total.inc_by(report.duplicates_resolved as u64);
            metrics.canonical_records.set(report.total_records as f64);
        }

        if let Err(e) = std::fs::remove_file(&staged.path) {
            warn!("Could not clear staged bundle {:?}: {}", staged.path, e);
        }

        summary.merge = Some(report);
        Ok(merged)
    }

    async fn train(&self, dataset: CanonicalDataset, now: DateTime<Utc>) -> Result<Vec<HorizonOutcome>, PipelineError> {
        let trainer = self.trainer.clone();
        let horizons = self.options.horizons.clone();

        tokio::task::spawn_blocking(move || trainer.train_all(&dataset, &horizons, now))
            .await
            .map_err(|e| PipelineError::TrainingAborted(e.to_string()))
    }

    async fn promote(&self, outcome: HorizonOutcome, now: DateTime<Utc>) -> Result<HorizonSummary, PipelineError> {
        let training = match outcome {
            HorizonOutcome::Skipped(skipped) => {
                warn!(
                    "Horizon {} skipped: {} ({} samples, recommended span {}h)",
                    skipped.horizon, skipped.reason, skipped.available_samples, skipped.recommended_span_hours
                );
                return Ok(HorizonSummary::skipped(&skipped));
            }
            HorizonOutcome::Trained(training) => training,
        };

        let mut line = HorizonSummary::trained(&training);
        let horizon_label = training.horizon.to_string();

        if let Some(metrics) = &self.metrics {
            for candidate in &training.candidates {
                metrics.inc_trained(&horizon_label, candidate.algorithm.as_str());
            }
            for (tag, _) in &training.failures {
                metrics.inc_failed(&horizon_label, tag.as_str());
            }
        }

        let Some(best) = training.best() else {
            warn!("Horizon {}: every candidate failed, nothing to promote", training.horizon);
            return Ok(line);
        };

        let outcome = self.gate.evaluate(best, now).await?;

        if let Some(metrics) = &self.metrics {
            let label = if outcome.decision.promoted { "promoted" } else { "kept_incumbent" };
            metrics.inc_promotion(&horizon_label, label);
            let deployed_rmse = if outcome.decision.promoted {
                Some(outcome.decision.candidate_rmse)
            } else {
                outcome.decision.incumbent_rmse
            };
            if let Some(rmse) = deployed_rmse {
                metrics.set_deployed_rmse(&horizon_label, rmse);
            }
        }

        line.version = Some(outcome.version);
        line.decision = Some(outcome.decision);
        Ok(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ml::algorithms::{AlgorithmKind, AlgorithmSettings, SmartcoreRegressor};
    use crate::application::ml::dataset::SplitPolicy;
    use crate::application::sync::fetcher::RetryPolicy;
    use crate::application::sync::freshness::FreshnessPolicy;
    use crate::domain::features::{ArtifactBundle, BundleMeta, RawFeatureRecord, RunId};
    use crate::domain::ports::{ArtifactTransport, Regressor};
    use crate::domain::repositories::ModelRegistry;
    use crate::infrastructure::repositories::{InMemoryCanonicalStore, InMemoryModelRegistry, InMemorySnapshotStore};
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    struct ScriptedTransport {
        bundles: Mutex<BTreeMap<u64, ArtifactBundle>>,
    }

    impl ScriptedTransport {
        fn new() -> Self {
            Self {
                bundles: Mutex::new(BTreeMap::new()),
            }
        }

        fn publish(&self, bundle: ArtifactBundle) {
            self.bundles.lock().insert(bundle.meta.run_id.0, bundle);
        }
    }

    #[async_trait]
    impl ArtifactTransport for ScriptedTransport {
        async fn list_bundles_since(&self, since: DateTime<Utc>) -> Result<Vec<BundleMeta>, FetchError> {
            Ok(self
                .bundles
                .lock()
                .values()
                .filter(|b| b.meta.created_at >= since)
                .map(|b| b.meta.clone())
                .collect())
        }

        async fn fetch_bundle(&self, run_id: RunId) -> Result<ArtifactBundle, FetchError> {
            self.bundles
                .lock()
                .get(&run_id.0)
                .cloned()
                .ok_or_else(|| FetchError::not_found(format!("run {}", run_id)))
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn hourly_bundle(run: u64, hours: std::ops::Range<i64>) -> ArtifactBundle {
        let records = hours
            .clone()
            .map(|h| {
                let ts = start() + Duration::hours(h);
                RawFeatureRecord {
                    entity_id: Some("karachi".to_string()),
                    timestamp: Some(ts.to_rfc3339()),
                    aqi: Some(80.0 + (h % 24) as f64 * 2.0 + (h as f64 * 0.1)),
                    temp: Some(18.0 + (h % 24) as f64 * 0.5),
                    humidity: Some(55.0 + (h % 7) as f64),
                    pressure: Some(1008.0 + (h % 5) as f64),
                    wind_speed: Some(2.0 + (h % 3) as f64),
                    dew: Some(9.0 + (h % 4) as f64),
                    pm25: Some(40.0 + (h % 24) as f64),
                    ..Default::default()
                }
            })
            .collect();
        let created_at = start() + Duration::hours(hours.end);
        ArtifactBundle::new(run, created_at, records)
    }

    struct Fixture {
        transport: Arc<ScriptedTransport>,
        canonical: Arc<InMemoryCanonicalStore>,
        registry: Arc<InMemoryModelRegistry>,
        driver: PipelineDriver,
        _staging: tempfile::TempDir,
    }

    fn fixture(horizons: Vec<Horizon>) -> Fixture {
        let staging = tempfile::tempdir().unwrap();
        let transport = Arc::new(ScriptedTransport::new());
        let canonical = Arc::new(InMemoryCanonicalStore::new());
        let registry = Arc::new(InMemoryModelRegistry::new());
        let regressors: Vec<Arc<dyn Regressor>> = vec![
            Arc::new(SmartcoreRegressor::new(AlgorithmKind::LinearRegression, AlgorithmSettings::default())),
            Arc::new(SmartcoreRegressor::new(AlgorithmKind::MeanBaseline, AlgorithmSettings::default())),
        ];

        let driver = PipelineDriver::new(
            ArtifactFetcher::new(
                transport.clone(),
                staging.path().to_path_buf(),
                RetryPolicy {
                    max_attempts: 1,
                    base_delay: std::time::Duration::from_millis(1),
                    max_delay: std::time::Duration::from_millis(1),
                },
            ),
            canonical.clone(),
            Arc::new(MaterializationEngine::new(Arc::new(InMemorySnapshotStore::new()))),
            FreshnessVerifier::new(FreshnessPolicy::default()),
            Arc::new(MultiHorizonTrainer::new(regressors, SplitPolicy::default(), 2).unwrap()),
            PromotionGate::new(registry.clone()),
            PipelineOptions {
                selection_policy: SelectionPolicy::MostRecentCompleted,
                lookback: Duration::hours(24),
                horizons,
                scope: MaterializationScope::all(),
            },
        );

        Fixture {
            transport,
            canonical,
            registry,
            driver,
            _staging: staging,
        }
    }

    #[tokio::test]
    async fn test_full_cycle_promotes_first_candidate() {
        let fx = fixture(vec![Horizon(24)]);
        fx.transport.publish(hourly_bundle(1, 0..60));
        let now = start() + Duration::hours(60);

        let summary = fx.driver.run(now).await;

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.fetched_run, Some(1));
        assert_eq!(summary.records_merged(), 60);
        assert_eq!(summary.snapshot_generation, Some(1));
        let line = summary.horizon(Horizon(24)).unwrap();
        assert!(line.promoted());
        assert_eq!(line.version, Some(1));
        assert!(fx.registry.get_active(Horizon(24)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_not_ready_is_a_normal_outcome() {
        let fx = fixture(vec![Horizon(72)]);
        fx.transport.publish(hourly_bundle(1, 0..30));
        let now = start() + Duration::hours(30);

        let summary = fx.driver.run(now).await;

        assert_eq!(summary.outcome, RunOutcome::NotReady);
        assert!(summary.readiness.unwrap().starts_with("not_ready"));
        assert!(summary.horizons.is_empty());
        assert_eq!(fx.canonical.commit_count(), 1);
    }

    #[tokio::test]
    async fn test_remerge_of_same_bundle_does_not_rewrite_log() {
        let fx = fixture(vec![Horizon(24)]);
        fx.transport.publish(hourly_bundle(1, 0..60));
        let now = start() + Duration::hours(60);

        fx.driver.run(now).await;
        let second = fx.driver.run(now).await;

        assert_eq!(second.records_merged(), 0);
        assert_eq!(fx.canonical.commit_count(), 1);
        let line = second.horizon(Horizon(24)).unwrap();
        assert_eq!(line.version, Some(2));
        assert!(!line.promoted());
    }

    #[tokio::test]
    async fn test_missing_bundle_continues_with_existing_dataset() {
        let fx = fixture(vec![Horizon(24)]);
        let now = start() + Duration::hours(60);

        let summary = fx.driver.run(now).await;

        assert_eq!(summary.fetched_run, None);
        assert!(summary.merge.is_none());
        assert_eq!(summary.outcome, RunOutcome::NotReady);
    }
}
