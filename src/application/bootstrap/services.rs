use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::application::bootstrap::persistence::PersistenceHandle;
use crate::application::ml::algorithms::build_regressors;
use crate::application::ml::trainer::MultiHorizonTrainer;
use crate::application::pipeline::{PipelineDriver, PipelineOptions};
use crate::application::promotion::gate::PromotionGate;
use crate::application::serving::ServingView;
use crate::application::sync::fetcher::ArtifactFetcher;
use crate::application::sync::freshness::FreshnessVerifier;
use crate::application::sync::materializer::{MaterializationEngine, MaterializationScope};
use crate::config::{Config, TransportKind};
use crate::domain::ports::ArtifactTransport;
use crate::infrastructure::observability::Metrics;
use crate::infrastructure::transport::{HttpArtifactTransport, LocalArtifactTransport};

pub struct PipelineHandle {
    pub driver: PipelineDriver,
    pub serving: ServingView,
    pub metrics: Metrics,
}

pub struct ServicesBootstrap;

impl ServicesBootstrap {
    pub fn create_transport(config: &Config) -> Result<Arc<dyn ArtifactTransport>> {
        let transport: Arc<dyn ArtifactTransport> = match config.transport.kind {
            TransportKind::Http => {
                info!("Artifact transport: HTTP at {}", config.transport.base_url);
                Arc::new(HttpArtifactTransport::new(
                    &config.transport.base_url,
                    config.transport.api_token.clone(),
                    &config.transport.http_settings(),
                )?)
            }
            TransportKind::Local => {
                info!("Artifact transport: directory {:?}", config.transport.local_dir);
                Arc::new(LocalArtifactTransport::new(config.transport.local_dir.clone()))
            }
        };
        Ok(transport)
    }

    pub fn init(config: &Config, persistence: &PersistenceHandle) -> Result<PipelineHandle> {
        // 1. Sync side
        let transport = Self::create_transport(config)?;
        let fetcher = ArtifactFetcher::new(
            transport,
            config.store.staging_dir.clone(),
            config.transport.retry_policy(),
        );
        let materializer = Arc::new(
            MaterializationEngine::restore(persistence.snapshot_store.clone())
                .context("Failed to restore online snapshot")?,
        );
        let verifier = FreshnessVerifier::new(config.freshness.policy());

        // 2. Training side
        let regressors = build_regressors(&config.pipeline.algorithms, &config.pipeline.algorithm_settings())?;
        let trainer = Arc::new(MultiHorizonTrainer::new(
            regressors,
            config.pipeline.split_policy(),
            config.pipeline.training_workers,
        )?);
        let gate = PromotionGate::new(persistence.registry.clone());

        let options = PipelineOptions {
            selection_policy: config.pipeline.selection_policy.clone(),
            lookback: config.pipeline.lookback(),
            horizons: config.pipeline.horizons.clone(),
            scope: MaterializationScope::all(),
        };

        let metrics = Metrics::new()?;
        let serving = ServingView::new(materializer.handle(), persistence.registry.clone());
        let driver = PipelineDriver::new(
            fetcher,
            persistence.canonical_store.clone(),
            materializer,
            verifier,
            trainer,
            gate,
            options,
        )
        .with_metrics(metrics.clone());

        Ok(PipelineHandle {
            driver,
            serving,
            metrics,
        })
    }
}
