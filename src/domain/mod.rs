// Feature records, bundles, canonical dataset, online snapshot
pub mod features;

// Horizons, candidates, deployments, feature vectorization
pub mod ml;

// Port interfaces
pub mod ports;

// Repository traits
pub mod repositories;

// Domain-specific error types
pub mod errors;
