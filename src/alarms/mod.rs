//! Alarm rule evaluation and group aggregation (§4.4).

mod evaluator;

pub use evaluator::AlarmEvaluator;
