mod basic;
mod compare;
mod set;

pub use basic::{evaluate, BasicThreshold};
pub use compare::{CompareOp, MatchType};
pub use set::Thresholds;
