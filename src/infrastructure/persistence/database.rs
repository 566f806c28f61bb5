use anyhow::{Context, Result};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// SQLite handle for the model registry
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        // Ensure the directory exists if it's a file path
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        let options = SqliteConnectOptions::from_str(db_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("Failed to connect to SQLite database")?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        // 1. Model versions: every appended candidate, never updated
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS model_versions (
                horizon_hours INTEGER NOT NULL,
                version INTEGER NOT NULL,
                algorithm TEXT NOT NULL,
                mae REAL NOT NULL,
                rmse REAL NOT NULL,
                r2 REAL NOT NULL,
                mape REAL,
                mape_excluded INTEGER NOT NULL,
                n_train INTEGER NOT NULL,
                n_test INTEGER NOT NULL,
                window_start INTEGER NOT NULL,
                window_end INTEGER NOT NULL,
                trained_at INTEGER NOT NULL,
                artifact_json TEXT NOT NULL,
                deployed BOOLEAN NOT NULL DEFAULT 0,
                created_at INTEGER DEFAULT (strftime('%s', 'now')),
                PRIMARY KEY (horizon_hours, version)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create model_versions table")?;

        // 2. Promotion decisions, one per version
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS promotion_decisions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                horizon_hours INTEGER NOT NULL,
                version INTEGER NOT NULL,
                promoted BOOLEAN NOT NULL,
                reason TEXT NOT NULL,
                candidate_rmse REAL NOT NULL,
                incumbent_version INTEGER,
                incumbent_rmse REAL,
                decided_at INTEGER NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_decisions_horizon_version
            ON promotion_decisions (horizon_hours, version);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create promotion_decisions table")?;

        // 3. Deployment pointer history; the newest row per horizon is active
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS deployments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                horizon_hours INTEGER NOT NULL,
                version INTEGER NOT NULL,
                promoted_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_deployments_horizon
            ON deployments (horizon_hours, id);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create deployments table")?;

        info!("Database schema initialized.");
        Ok(())
    }
}
