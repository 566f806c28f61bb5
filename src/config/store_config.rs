//! Storage locations parsed from environment variables.
//!
//! Every path defaults to a file below `AQI_DATA_DIR`.

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct StoreEnvConfig {
    pub data_dir: PathBuf,
    /// Canonical dataset CSV log
    pub canonical_path: PathBuf,
    /// Online snapshot JSON document
    pub snapshot_path: PathBuf,
    /// Where fetched bundles are staged before merge
    pub staging_dir: PathBuf,
    /// SQLite URL of the model registry
    pub database_url: String,
}

impl StoreEnvConfig {
    pub fn from_env() -> Self {
        let data_dir = PathBuf::from(env::var("AQI_DATA_DIR").unwrap_or_else(|_| "data".to_string()));
        Self::with_overrides(data_dir, |key| env::var(key).ok())
    }

    fn with_overrides(data_dir: PathBuf, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let path_or = |key: &str, default: PathBuf| lookup(key).map(PathBuf::from).unwrap_or(default);

        Self {
            canonical_path: path_or("AQI_CANONICAL_PATH", data_dir.join("canonical").join("features.csv")),
            snapshot_path: path_or("AQI_SNAPSHOT_PATH", data_dir.join("online").join("snapshot.json")),
            staging_dir: path_or("AQI_STAGING_DIR", data_dir.join("staging")),
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| format!("sqlite://{}", data_dir.join("registry.db").display())),
            data_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_default_below_data_dir() {
        let config = StoreEnvConfig::with_overrides(PathBuf::from("/var/lib/aqi"), |_| None);
        assert_eq!(config.canonical_path, PathBuf::from("/var/lib/aqi/canonical/features.csv"));
        assert_eq!(config.staging_dir, PathBuf::from("/var/lib/aqi/staging"));
        assert_eq!(config.database_url, "sqlite:///var/lib/aqi/registry.db");
    }

    #[test]
    fn test_explicit_override_wins() {
        let config = StoreEnvConfig::with_overrides(PathBuf::from("data"), |key| {
            (key == "DATABASE_URL").then(|| "sqlite::memory:".to_string())
        });
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.snapshot_path, PathBuf::from("data/online/snapshot.json"));
    }
}
