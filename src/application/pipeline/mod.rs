pub mod driver;
pub mod summary;

pub use driver::{PipelineDriver, PipelineOptions};
pub use summary::{HorizonSummary, RunOutcome, RunSummary};
