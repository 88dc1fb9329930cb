//! Health assessment output types (§3, §4.7).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    Healthy,
    Attention,
    Warning,
    Critical,
}

impl std::fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthLevel::Healthy => "Healthy",
            HealthLevel::Attention => "Attention",
            HealthLevel::Warning => "Warning",
            HealthLevel::Critical => "Critical",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TagImportance {
    Auxiliary = 20,
    Minor = 40,
    Major = 70,
    Critical = 100,
}

impl TagImportance {
    pub fn weight(self) -> f64 {
        self as i32 as f64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceHealthSnapshot {
    pub device_id: u64,
    pub ts: i64,
    pub index: f64,
    pub level: HealthLevel,
    pub deviation_score: f64,
    pub trend_score: f64,
    pub stability_score: f64,
    pub alarm_score: f64,
    pub confidence: f64,
}

/// Per-tag baseline maintained by the health engine (distinct from the
/// motor baseline learner's `BaselineProfile` — this one is mode-agnostic
/// and feeds deviation/stability scoring directly).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceBaseline {
    pub tag_id: u64,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
    pub p05: f64,
    pub p95: f64,
    pub sample_count: u64,
    pub learning_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemTag {
    pub tag_id: u64,
    pub z_score: f64,
    pub importance: TagImportance,
    pub description: String,
}

/// Resolves `TagImportance` by matching a tag's name against a glob pattern
/// (`*` wildcard only). Evaluated in descending `priority`; the first
/// enabled match wins. A tag matching no rule falls back to
/// `HealthAssessmentConfig::default_tag_importance`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagImportanceRule {
    pub rule_id: u64,
    pub pattern: String,
    pub importance: TagImportance,
    pub priority: i32,
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationMode {
    SameDirection,
    OppositeDirection,
    ThresholdCombination,
}

/// A correlation check between two tags on a device, matched by glob
/// pattern on both the device name and each tag name (§4.7). On trigger the
/// health engine subtracts `penalty_score` from the composite index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagCorrelationRule {
    pub rule_id: u64,
    pub device_pattern: String,
    pub tag1_pattern: String,
    pub tag2_pattern: String,
    pub mode: CorrelationMode,
    pub threshold: f64,
    pub penalty_score: f64,
    pub enabled: bool,
}

/// A window-scale tag in the multi-scale assessment (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Stable,
    Degrading,
}

/// Full output of one health assessment pass: the composite snapshot plus
/// the diagnostic detail (§4.7) a caller needs to act on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthAssessment {
    pub snapshot: DeviceHealthSnapshot,
    pub problem_tags: Vec<ProblemTag>,
    pub trend_direction: Option<TrendDirection>,
    /// Explains a sub-100% confidence, e.g. "only 12/30 required samples".
    pub confidence_note: Option<String>,
    pub triggered_correlations: Vec<u64>,
}
