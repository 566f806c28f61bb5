use crate::domain::features::OnlineSnapshot;
use crate::domain::repositories::SnapshotStore;
use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Online snapshot as a single JSON document keyed by entity_id
pub struct JsonSnapshotStore {
    file_path: PathBuf,
}

impl JsonSnapshotStore {
    pub fn new(file_path: PathBuf) -> Self {
        Self { file_path }
    }
}

impl SnapshotStore for JsonSnapshotStore {
    fn load(&self) -> Result<Option<OnlineSnapshot>> {
        if !self.file_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.file_path).context("Failed to read snapshot file")?;
        let snapshot: OnlineSnapshot = serde_json::from_str(&content).context("Failed to parse snapshot JSON")?;
        Ok(Some(snapshot))
    }

    fn replace(&self, snapshot: &OnlineSnapshot) -> Result<()> {
        if let Some(parent) = self.file_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).context("Failed to create snapshot directory")?;
        }

        let content = serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")?;

        // Atomic write: write to temp file then rename
        let temp_path = self.file_path.with_extension("tmp");
        fs::write(&temp_path, content).context("Failed to write temp snapshot file")?;
        fs::rename(&temp_path, &self.file_path).context("Failed to rename snapshot file")?;

        debug!("Saved snapshot generation {} to {:?}", snapshot.generation, self.file_path);
        Ok(())
    }
}
