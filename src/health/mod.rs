//! Device health assessment engine (§4.7): a composite 0-100 index built
//! from deviation-from-baseline, multi-scale trend, stability, and alarm
//! sub-scores, plus tag-importance weighting and cross-tag correlation
//! checks.

mod baseline;
mod engine;
mod importance;

pub use baseline::{HealthBaselineStore, TagKey};
pub use engine::HealthEngine;
pub use importance::ImportanceResolver;
