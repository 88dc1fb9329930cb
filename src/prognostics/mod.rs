//! Prognostics (§4.8): trend projection, degradation detection, and
//! remaining-useful-life estimation, each decoupled from the subsystems that
//! would otherwise feed them directly — callers pre-fetch history and pass
//! it in, so these engines stay testable without a live store or health
//! engine wired up.

mod degradation;
mod rul;
mod trend;

pub use degradation::DegradationDetector;
pub use rul::RulEstimator;
pub use trend::TrendPredictor;
