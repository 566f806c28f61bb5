//! Prometheus metrics for the AQI forecast pipeline
//!
//! All metrics use the `aqi_` prefix. Nothing is served over HTTP: the
//! rendered text is written to a file for the node-exporter textfile
//! collector after each cycle.

use anyhow::Context;
use prometheus::{
    CounterVec, Gauge, GaugeVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
    core::{AtomicF64, GenericGauge},
};
use std::fs;
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    /// Pipeline cycles by final status
    pub cycles_total: IntCounterVec,
    /// Records that made it into the canonical dataset
    pub records_merged_total: IntCounter,
    /// Records dropped for failing the schema
    pub records_rejected_total: IntCounter,
    /// Incoming records that replaced or duplicated an existing key
    pub duplicates_resolved_total: IntCounter,
    /// Size of the canonical dataset after the last merge
    pub canonical_records: GenericGauge<AtomicF64>,
    /// Generation of the published online snapshot
    pub snapshot_generation: GenericGauge<AtomicF64>,
    /// Trained candidates by horizon and algorithm
    pub candidates_trained_total: CounterVec,
    /// Failed training units by horizon and algorithm
    pub candidates_failed_total: CounterVec,
    /// Promotion decisions by horizon and outcome
    pub promotions_total: CounterVec,
    /// Test RMSE of the deployed model per horizon
    pub deployed_rmse: GaugeVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let cycles_total = IntCounterVec::new(
            Opts::new("aqi_pipeline_cycles_total", "Pipeline cycles by status"),
            &["status"],
        )?;
        registry.register(Box::new(cycles_total.clone()))?;

        let records_merged_total = IntCounter::with_opts(Opts::new(
            "aqi_records_merged_total",
            "Records merged into the canonical dataset",
        ))?;
        registry.register(Box::new(records_merged_total.clone()))?;

        let records_rejected_total = IntCounter::with_opts(Opts::new(
            "aqi_records_rejected_total",
            "Records rejected by schema validation",
        ))?;
        registry.register(Box::new(records_rejected_total.clone()))?;

        let duplicates_resolved_total = IntCounter::with_opts(Opts::new(
            "aqi_duplicates_resolved_total",
            "Duplicate (entity, timestamp) keys resolved during merge",
        ))?;
        registry.register(Box::new(duplicates_resolved_total.clone()))?;

        let canonical_records = Gauge::with_opts(Opts::new(
            "aqi_canonical_records",
            "Records in the canonical dataset",
        ))?;
        registry.register(Box::new(canonical_records.clone()))?;

        let snapshot_generation = Gauge::with_opts(Opts::new(
            "aqi_snapshot_generation",
            "Generation of the published online snapshot",
        ))?;
        registry.register(Box::new(snapshot_generation.clone()))?;

        let candidates_trained_total = CounterVec::new(
            Opts::new("aqi_candidates_trained_total", "Trained model candidates"),
            &["horizon", "algorithm"],
        )?;
        registry.register(Box::new(candidates_trained_total.clone()))?;

        let candidates_failed_total = CounterVec::new(
            Opts::new("aqi_candidates_failed_total", "Failed training units"),
            &["horizon", "algorithm"],
        )?;
        registry.register(Box::new(candidates_failed_total.clone()))?;

        let promotions_total = CounterVec::new(
            Opts::new("aqi_promotions_total", "Promotion decisions"),
            &["horizon", "outcome"],
        )?;
        registry.register(Box::new(promotions_total.clone()))?;

        let deployed_rmse = GaugeVec::new(
            Opts::new("aqi_deployed_rmse", "Test RMSE of the deployed model"),
            &["horizon"],
        )?;
        registry.register(Box::new(deployed_rmse.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            cycles_total,
            records_merged_total,
            records_rejected_total,
            duplicates_resolved_total,
            canonical_records,
            snapshot_generation,
            candidates_trained_total,
            candidates_failed_total,
            promotions_total,
            deployed_rmse,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    /// Write the rendered metrics for a textfile collector (temp file + rename)
    pub fn write_textfile(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).context("Failed to create metrics directory")?;
        }
        let temp_path = path.with_extension("prom.tmp");
        fs::write(&temp_path, self.render()).context("Failed to write metrics file")?;
        fs::rename(&temp_path, path).context("Failed to rename metrics file")?;
        Ok(())
    }

    pub fn inc_trained(&self, horizon: &str, algorithm: &str) {
        self.candidates_trained_total
            .with_label_values(&[horizon, algorithm])
            .inc();
    }

    pub fn inc_failed(&self, horizon: &str, algorithm: &str) {
        self.candidates_failed_total
            .with_label_values(&[horizon, algorithm])
            .inc();
    }

    pub fn inc_promotion(&self, horizon: &str, outcome: &str) {
        self.promotions_total
            .with_label_values(&[horizon, outcome])
            .inc();
    }

    pub fn set_deployed_rmse(&self, horizon: &str, rmse: f64) {
        self.deployed_rmse.with_label_values(&[horizon]).set(rmse);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        metrics.records_merged_total.inc_by(90);
        assert!(metrics.render().contains("aqi_records_merged_total 90"));
    }

    #[test]
    fn test_labelled_series() {
        let metrics = Metrics::new().expect("Failed to create metrics");
        metrics.inc_trained("24h", "random_forest");
        metrics.inc_promotion("24h", "promoted");
        metrics.set_deployed_rmse("24h", 17.5);

        let output = metrics.render();
        assert!(output.contains("aqi_candidates_trained_total"));
        assert!(output.contains("random_forest"));
        assert!(output.contains("aqi_deployed_rmse{horizon=\"24h\"} 17.5"));
    }

    #[test]
    fn test_write_textfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics").join("aqi.prom");
        let metrics = Metrics::new().unwrap();
        metrics.cycles_total.with_label_values(&["success"]).inc();

        metrics.write_textfile(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("aqi_pipeline_cycles_total{status=\"success\"} 1"));
    }
}
