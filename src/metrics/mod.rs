//! Control-plane metrics.

mod collector;

pub use collector::{PolicyMetrics, StateLabel, StateLabels};
