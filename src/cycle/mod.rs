//! Angle-based cycle segmentation and anomaly scoring (§4.5).

mod analyzer;
mod extractor;

pub use analyzer::CycleAnalyzer;
pub use extractor::{AngleCrossingExtractor, CycleBounds, CycleFeatureExtractor};
