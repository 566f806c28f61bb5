//! Push-based observability
//!
//! Metrics are only ever sent out: rendered into the run log and optionally
//! written to a file for a Prometheus textfile collector. No HTTP server.

pub mod metrics;

pub use metrics::Metrics;
