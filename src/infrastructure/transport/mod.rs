//! Artifact transports: where upstream bundles are listed and fetched from

pub mod http;
pub mod local;

pub use http::HttpArtifactTransport;
pub use local::LocalArtifactTransport;
