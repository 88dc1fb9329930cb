//! Derived `WorkCycle` entities produced by the cycle analyzer (§4.5).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleAnomalyType {
    OverCurrent,
    MotorImbalance,
    CycleTimeout,
    CycleTooShort,
    BaselineDeviation,
    AngleStall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkCycle {
    pub device_id: u64,
    pub segment_id: Option<u64>,
    pub start: i64,
    pub end: i64,
    pub duration_s: f64,
    pub max_angle: f64,
    pub motor1_peak: f64,
    pub motor1_avg: f64,
    pub motor2_peak: f64,
    pub motor2_avg: f64,
    pub energy: f64,
    pub balance_ratio: f64,
    pub baseline_deviation_pct: f64,
    pub anomaly_score: f64,
    pub is_anomaly: bool,
    pub anomaly_type: Option<CycleAnomalyType>,
}

/// Per-integer-angle-bucket baseline statistics, plus the fitted polynomial
/// `c(θ) = aθ² + bθ + c` current-vs-angle model (§4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleDeviceBaseline {
    pub device_id: u64,
    /// Quadratic coefficients `(a, b, c)`.
    pub poly_coeffs: (f64, f64, f64),
    pub r_squared: f64,
    /// keyed by integer angle degree.
    pub angle_buckets: std::collections::BTreeMap<i32, AngleBucketStats>,
    pub sample_count: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AngleBucketStats {
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub count: u64,
}

impl CycleDeviceBaseline {
    pub fn predict(&self, angle: f64) -> f64 {
        let (a, b, c) = self.poly_coeffs;
        a * angle * angle + b * angle + c
    }
}
