// Data synchronization: fetch, merge, materialize, readiness
pub mod sync;

// Training and evaluation
pub mod ml;

// Candidate vs incumbent decisions
pub mod promotion;

// Stage orchestration and run summaries
pub mod pipeline;

// Wiring from configuration
pub mod bootstrap;

// Read-only access for consumers
pub mod serving;
