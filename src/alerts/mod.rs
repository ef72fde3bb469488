pub mod dispatch;
pub mod evaluator;
pub mod message;
pub mod working_set;

pub use dispatch::DispatchQueue;
pub use evaluator::{AlertEvaluationEngine, PendingTriggers};
pub use working_set::AlertWorkingSet;
