pub mod algorithms;
pub mod dataset;
pub mod evaluator;
pub mod trainer;

pub use algorithms::{AlgorithmKind, AlgorithmSettings, SmartcoreRegressor, build_regressors, load_artifact};
pub use dataset::{SplitPolicy, SupervisedSet};
pub use evaluator::Evaluator;
pub use trainer::{HorizonOutcome, HorizonTraining, MultiHorizonTrainer};
