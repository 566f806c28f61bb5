use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::StoreEnvConfig;
use crate::domain::repositories::{CanonicalStore, ModelRegistry, SnapshotStore};
use crate::infrastructure::persistence::canonical_store::CsvCanonicalStore;
use crate::infrastructure::persistence::database::Database;
use crate::infrastructure::persistence::registry_repository::SqliteModelRegistry;
use crate::infrastructure::persistence::snapshot_store::JsonSnapshotStore;

pub struct PersistenceHandle {
    pub db: Database,
    pub registry: Arc<dyn ModelRegistry>,
    pub canonical_store: Arc<dyn CanonicalStore>,
    pub snapshot_store: Arc<dyn SnapshotStore>,
}

pub struct PersistenceBootstrap;

impl PersistenceBootstrap {
    pub async fn init(store: &StoreEnvConfig) -> Result<PersistenceHandle> {
        info!("Initializing model registry at {}", store.database_url);

        let db = Database::new(&store.database_url)
            .await
            .context("Failed to initialize database")?;

        let registry = Arc::new(SqliteModelRegistry::new(db.pool.clone()));
        let canonical_store = Arc::new(CsvCanonicalStore::new(store.canonical_path.clone()));
        let snapshot_store = Arc::new(JsonSnapshotStore::new(store.snapshot_path.clone()));

        Ok(PersistenceHandle {
            db,
            registry,
            canonical_store,
            snapshot_store,
        })
    }
}
