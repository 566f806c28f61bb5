pub mod gate;

pub use gate::{PromotionGate, PromotionOutcome};
