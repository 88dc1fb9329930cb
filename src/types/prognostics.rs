//! Prognostics output types: trend prediction, degradation events, and RUL
//! (§4.8).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for RiskLevel {
    fn default() -> Self {
        RiskLevel::Low
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::Critical => "Critical",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    None,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendPrediction {
    pub device_id: u64,
    pub tag_id: u64,
    /// hours⁻¹.
    pub trend_slope: f64,
    pub confidence: f64,
    pub hours_to_threshold: Option<f64>,
    pub alert_level: AlertLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationType {
    GradualIncrease,
    GradualDecrease,
    IncreasingVariance,
    CycleAnomaly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradationEvent {
    pub device_id: u64,
    pub tag_id: u64,
    pub ts: i64,
    pub degradation_type: DegradationType,
    pub rate_pct_per_day: f64,
    pub consecutive_confirmations: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulModelType {
    Linear,
    Exponential,
    Weibull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulStatus {
    Healthy,
    NormalDegradation,
    Accelerated,
    NearFailure,
    InsufficientData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulFactor {
    pub tag_id: u64,
    /// `z / Σz`.
    pub weight: f64,
    /// `sign(Δslope) * weight`.
    pub contribution: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulEstimate {
    pub device_id: u64,
    pub ts: i64,
    pub model: RulModelType,
    pub rul_hours: f64,
    pub confidence: f64,
    pub status: RulStatus,
    pub risk_level: RiskLevel,
    pub recommended_maintenance_time: i64,
    pub factors: Vec<RulFactor>,
}
