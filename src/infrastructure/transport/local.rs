use crate::application::sync::fetcher::staged_path;
use crate::domain::errors::FetchError;
use crate::domain::features::{ArtifactBundle, BundleMeta, RunId};
use crate::domain::ports::ArtifactTransport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tokio::fs;
use tracing::warn;

/// Artifact store backed by a directory of `bundle-<run_id>.json` files,
/// e.g. a synced bucket or a CI artifact download folder.
pub struct LocalArtifactTransport {
    root: PathBuf,
}

impl LocalArtifactTransport {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    async fn read_bundle(&self, path: &std::path::Path) -> Result<ArtifactBundle, FetchError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| FetchError::transport(format!("Failed to read {:?}: {}", path, e)))?;
        serde_json::from_str(&content)
            .map_err(|e| FetchError::transport(format!("Failed to decode {:?}: {}", path, e)))
    }
}

#[async_trait]
impl ArtifactTransport for LocalArtifactTransport {
    async fn list_bundles_since(&self, since: DateTime<Utc>) -> Result<Vec<BundleMeta>, FetchError> {
        if !self.root.exists() {
            return Err(FetchError::not_found(format!("artifact directory {:?} does not exist", self.root)));
        }

        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| FetchError::transport(format!("Failed to list {:?}: {}", self.root, e)))?;

        let mut metas = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FetchError::transport(format!("Failed to list {:?}: {}", self.root, e)))?
        {
            let path = entry.path();
            let is_bundle = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("bundle-") && n.ends_with(".json"));
            if !is_bundle {
                continue;
            }

            match self.read_bundle(&path).await {
                Ok(bundle) if bundle.meta.created_at >= since => metas.push(bundle.meta),
                Ok(_) => {}
                // One unreadable file must not hide the others
                Err(e) => warn!("LocalArtifactTransport: skipping {:?}: {}", path, e),
            }
        }

        Ok(metas)
    }

    async fn fetch_bundle(&self, run_id: RunId) -> Result<ArtifactBundle, FetchError> {
        let path = staged_path(&self.root, run_id);
        if !path.exists() {
            return Err(FetchError::not_found(format!("no bundle for run {} in {:?}", run_id, self.root)));
        }
        self.read_bundle(&path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn write_bundle(dir: &std::path::Path, run: u64, hour: u32) {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, hour, 0, 0).unwrap();
        let bundle = ArtifactBundle::new(run, created, vec![]);
        std::fs::write(
            dir.join(format!("bundle-{}.json", run)),
            serde_json::to_string(&bundle).unwrap(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_lists_only_bundles_in_window() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(dir.path(), 1, 2);
        write_bundle(dir.path(), 2, 10);
        std::fs::write(dir.path().join("bundle-3.json"), "garbage").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let transport = LocalArtifactTransport::new(dir.path().to_path_buf());
        let metas = transport
            .list_bundles_since(Utc.with_ymd_and_hms(2024, 3, 1, 5, 0, 0).unwrap())
            .await
            .unwrap();

        assert_eq!(metas.len(), 1);
        assert_eq!(metas[0].run_id, RunId(2));
    }

    #[tokio::test]
    async fn test_fetch_missing_run_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(dir.path(), 1, 2);
        let transport = LocalArtifactTransport::new(dir.path().to_path_buf());

        assert!(transport.fetch_bundle(RunId(1)).await.is_ok());
        assert!(matches!(
            transport.fetch_bundle(RunId(9)).await,
            Err(FetchError::NotFound { .. })
        ));
    }
}
