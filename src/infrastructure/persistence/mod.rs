pub mod canonical_store;
pub mod database;
pub mod registry_repository;
pub mod snapshot_store;

pub use canonical_store::CsvCanonicalStore;
pub use database::Database;
pub use registry_repository::SqliteModelRegistry;
pub use snapshot_store::JsonSnapshotStore;
