pub mod evaluator;
pub mod stats;

pub use evaluator::{binary_outcome, SettlementEvaluator};
pub use stats::aggregate;
