//! Motor baseline learner (§4.6): operation-mode detection, incremental
//! per-mode statistics, and FFT-based frequency profiling for current tags.

mod baseline;
mod frequency;
mod mode;

pub use baseline::{BaselineKey, BaselineLearner};
pub use frequency::{build_frequency_profile, compute_spectrum, Spectrum};
pub use mode::ModeDetector;
