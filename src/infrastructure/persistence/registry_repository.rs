use crate::domain::ml::{
    AlgorithmTag, DecisionReason, DeployedModel, EvaluationMetrics, Horizon, ModelArtifact, ModelCandidate,
    PromotionDecision, RegistryEntry, TrainingWindow,
};
use crate::domain::repositories::ModelRegistry;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;

const CANDIDATE_COLUMNS: &str = r#"
    m.horizon_hours, m.version, m.algorithm, m.mae, m.rmse, m.r2, m.mape, m.mape_excluded,
    m.n_train, m.n_test, m.window_start, m.window_end, m.trained_at, m.artifact_json, m.deployed
"#;

/// SQLite-backed ModelRegistry. Rows are only ever inserted.
pub struct SqliteModelRegistry {
    pool: SqlitePool,
}

impl SqliteModelRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// The `offset`-th most recent deployment of a horizon
    async fn deployment_at(&self, horizon: Horizon, offset: i64) -> Result<Option<DeployedModel>> {
        let sql = format!(
            r#"
            SELECT {CANDIDATE_COLUMNS}, d.promoted_at
            FROM deployments d
            JOIN model_versions m ON m.horizon_hours = d.horizon_hours AND m.version = d.version
            WHERE d.horizon_hours = ?
            ORDER BY d.id DESC
            LIMIT 1 OFFSET ?
            "#
        );
        let row = sqlx::query(&sql)
            .bind(i64::from(horizon.hours()))
            .bind(offset)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query deployments")?;

        row.map(|row| -> Result<DeployedModel> {
            Ok(DeployedModel {
                version: row.try_get::<i64, _>("version")? as u64,
                promoted_at: from_millis(row.try_get("promoted_at")?)?,
                candidate: candidate_from_row(&row)?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl ModelRegistry for SqliteModelRegistry {
    async fn append(&self, candidate: &ModelCandidate, decision: &PromotionDecision) -> Result<u64> {
        let horizon = i64::from(candidate.horizon.hours());
        let artifact_json = serde_json::to_string(&candidate.artifact).context("Failed to serialize artifact")?;

        let mut tx = self.pool.begin().await.context("Failed to open registry transaction")?;

        let row = sqlx::query("SELECT COALESCE(MAX(version), 0) + 1 AS next FROM model_versions WHERE horizon_hours = ?")
            .bind(horizon)
            .fetch_one(&mut *tx)
            .await?;
        let version: i64 = row.try_get("next")?;

        sqlx::query(
            r#"
            INSERT INTO model_versions (
                horizon_hours, version, algorithm, mae, rmse, r2, mape, mape_excluded,
                n_train, n_test, window_start, window_end, trained_at, artifact_json, deployed
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(horizon)
        .bind(version)
        .bind(candidate.algorithm.as_str())
        .bind(candidate.metrics.mae)
        .bind(candidate.metrics.rmse)
        .bind(candidate.metrics.r2)
        .bind(candidate.metrics.mape)
        .bind(candidate.metrics.mape_excluded as i64)
        .bind(candidate.window.n_train as i64)
        .bind(candidate.window.n_test as i64)
        .bind(candidate.window.start.timestamp_millis())
        .bind(candidate.window.end.timestamp_millis())
        .bind(candidate.trained_at.timestamp_millis())
        .bind(&artifact_json)
        .bind(decision.promoted)
        .execute(&mut *tx)
        .await
        .context("Failed to insert model version")?;

        sqlx::query(
            r#"
            INSERT INTO promotion_decisions (
                horizon_hours, version, promoted, reason, candidate_rmse,
                incumbent_version, incumbent_rmse, decided_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(horizon)
        .bind(version)
        .bind(decision.promoted)
        .bind(decision.reason.to_string())
        .bind(decision.candidate_rmse)
        .bind(decision.incumbent_version.map(|v| v as i64))
        .bind(decision.incumbent_rmse)
        .bind(decision.decided_at.timestamp_millis())
        .execute(&mut *tx)
        .await
        .context("Failed to insert promotion decision")?;

        if decision.promoted {
            sqlx::query("INSERT INTO deployments (horizon_hours, version, promoted_at) VALUES (?, ?, ?)")
                .bind(horizon)
                .bind(version)
                .bind(decision.decided_at.timestamp_millis())
                .execute(&mut *tx)
                .await
                .context("Failed to move deployment pointer")?;
        }

        tx.commit().await.context("Failed to commit registry transaction")?;

        info!(
            "Persisted {} v{} ({}, deployed={})",
            candidate.horizon, version, candidate.algorithm, decision.promoted
        );
        Ok(version as u64)
    }

    async fn get_active(&self, horizon: Horizon) -> Result<Option<DeployedModel>> {
        self.deployment_at(horizon, 0).await
    }

    async fn list_history_filtered(
        &self,
        horizon: Horizon,
        limit: usize,
        algorithm: Option<&AlgorithmTag>,
    ) -> Result<Vec<RegistryEntry>> {
        let sql = format!(
            r#"
            SELECT {CANDIDATE_COLUMNS},
                p.promoted, p.reason, p.candidate_rmse, p.incumbent_version, p.incumbent_rmse, p.decided_at
            FROM model_versions m
            JOIN promotion_decisions p ON p.horizon_hours = m.horizon_hours AND p.version = m.version
            WHERE m.horizon_hours = ? AND (? IS NULL OR m.algorithm = ?)
            ORDER BY m.version DESC
            LIMIT ?
            "#
        );
        let algorithm = algorithm.map(AlgorithmTag::as_str);
        let rows = sqlx::query(&sql)
            .bind(i64::from(horizon.hours()))
            .bind(algorithm)
            .bind(algorithm)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context("Failed to query registry history")?;

        rows.iter()
            .map(|row| -> Result<RegistryEntry> {
                let reason: String = row.try_get("reason")?;
                Ok(RegistryEntry {
                    version: row.try_get::<i64, _>("version")? as u64,
                    candidate: candidate_from_row(row)?,
                    decision: PromotionDecision {
                        horizon,
                        promoted: row.try_get("promoted")?,
                        reason: DecisionReason::from_str(&reason)?,
                        candidate_rmse: row.try_get("candidate_rmse")?,
                        incumbent_version: row
                            .try_get::<Option<i64>, _>("incumbent_version")?
                            .map(|v| v as u64),
                        incumbent_rmse: row.try_get("incumbent_rmse")?,
                        decided_at: from_millis(row.try_get("decided_at")?)?,
                    },
                    deployed: row.try_get("deployed")?,
                })
            })
            .collect()
    }

    async fn rollback_target(&self, horizon: Horizon) -> Result<Option<DeployedModel>> {
        self.deployment_at(horizon, 1).await
    }
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).with_context(|| format!("Timestamp {} out of range", ms))
}

fn candidate_from_row(row: &SqliteRow) -> Result<ModelCandidate> {
    let artifact_json: String = row.try_get("artifact_json")?;
    let artifact: ModelArtifact = serde_json::from_str(&artifact_json).context("Corrupt artifact JSON")?;
    let algorithm: String = row.try_get("algorithm")?;

    Ok(ModelCandidate {
        horizon: Horizon(row.try_get::<i64, _>("horizon_hours")? as u32),
        algorithm: AlgorithmTag::new(algorithm),
        artifact,
        metrics: EvaluationMetrics {
            mae: row.try_get("mae")?,
            rmse: row.try_get("rmse")?,
            r2: row.try_get("r2")?,
            mape: row.try_get("mape")?,
            mape_excluded: row.try_get::<i64, _>("mape_excluded")? as usize,
            n_test: row.try_get::<i64, _>("n_test")? as usize,
        },
        window: TrainingWindow {
            start: from_millis(row.try_get("window_start")?)?,
            end: from_millis(row.try_get("window_end")?)?,
            n_train: row.try_get::<i64, _>("n_train")? as usize,
            n_test: row.try_get::<i64, _>("n_test")? as usize,
        },
        trained_at: from_millis(row.try_get("trained_at")?)?,
    })
}
