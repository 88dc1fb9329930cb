//! `PlantConfig`: the operator-tunable configuration tree backing every
//! constant named in SPEC_FULL §4 and the option table in §6.
//!
//! Loaded from TOML with `serde(default)` on every nested struct so a
//! partial config file only overrides the sections it mentions; everything
//! else falls back to the defaults in `super::defaults`.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::defaults as d;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    pub queue_capacity_global: usize,
    pub writer_batch_size: usize,
    pub writer_flush_ms: u64,
    pub writer_max_retries: u32,
    pub writer_retry_delay_ms: u64,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            queue_capacity_global: d::QUEUE_CAPACITY_GLOBAL,
            writer_batch_size: d::WRITER_BATCH_SIZE,
            writer_flush_ms: d::WRITER_FLUSH_MS,
            writer_max_retries: d::WRITER_MAX_RETRIES,
            writer_retry_delay_ms: d::WRITER_RETRY_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierAction {
    Drop,
    Mark,
    Pass,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub default_deadband: f64,
    pub default_deadband_percent: f64,
    pub min_interval_ms: u64,
    pub force_upload_interval_ms: u64,
    pub outlier_sigma_threshold: f64,
    pub outlier_action: OutlierAction,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            default_deadband: d::DEFAULT_DEADBAND,
            default_deadband_percent: d::DEFAULT_DEADBAND_PERCENT,
            min_interval_ms: d::MIN_INTERVAL_MS,
            force_upload_interval_ms: d::FORCE_UPLOAD_INTERVAL_MS,
            outlier_sigma_threshold: d::OUTLIER_SIGMA_THRESHOLD,
            outlier_action: OutlierAction::Mark,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionAlgorithm {
    None,
    Zstd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreForwardConfig {
    pub max_store_size_mb: u64,
    pub retention_days: u64,
    pub compression_algorithm: CompressionAlgorithm,
}

impl Default for StoreForwardConfig {
    fn default() -> Self {
        Self {
            max_store_size_mb: d::MAX_STORE_SIZE_MB,
            retention_days: d::STORE_FORWARD_RETENTION_DAYS,
            compression_algorithm: CompressionAlgorithm::Zstd,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub health_check_interval_ms: u64,
    pub health_check_timeout_ms: u64,
    pub offline_threshold: u32,
    pub send_batch_size: usize,
    pub send_interval_ms: u64,
    pub channel_capacity_batches: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            health_check_interval_ms: d::HEALTH_CHECK_INTERVAL_MS,
            health_check_timeout_ms: d::HEALTH_CHECK_TIMEOUT_MS,
            offline_threshold: d::OFFLINE_THRESHOLD,
            send_batch_size: d::SEND_BATCH_SIZE,
            send_interval_ms: d::SEND_INTERVAL_MS,
            channel_capacity_batches: d::CHANNEL_CAPACITY_BATCHES,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthWeights {
    pub deviation: f64,
    pub trend: f64,
    pub stability: f64,
    pub alarm: f64,
}

impl Default for HealthWeights {
    fn default() -> Self {
        Self {
            deviation: d::HEALTH_WEIGHT_DEVIATION,
            trend: d::HEALTH_WEIGHT_TREND,
            stability: d::HEALTH_WEIGHT_STABILITY,
            alarm: d::HEALTH_WEIGHT_ALARM,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthLevelThresholds {
    pub healthy_min: f64,
    pub attention_min: f64,
    pub warning_min: f64,
}

impl Default for HealthLevelThresholds {
    fn default() -> Self {
        Self {
            healthy_min: d::HEALTH_LEVEL_HEALTHY_MIN,
            attention_min: d::HEALTH_LEVEL_ATTENTION_MIN,
            warning_min: d::HEALTH_LEVEL_WARNING_MIN,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmScorePenalties {
    pub critical: f64,
    pub error: f64,
    pub warning: f64,
    pub info: f64,
}

impl Default for AlarmScorePenalties {
    fn default() -> Self {
        Self {
            critical: d::ALARM_PENALTY_CRITICAL,
            error: d::ALARM_PENALTY_ERROR,
            warning: d::ALARM_PENALTY_WARNING,
            info: d::ALARM_PENALTY_INFO,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthAssessmentConfig {
    pub weights: HealthWeights,
    pub level_thresholds: HealthLevelThresholds,
    pub default_window_minutes: u64,
    pub min_sample_count: u64,
    /// Trend-score slope-to-penalty gain (§4.7).
    pub trend_k: f64,
    /// Stability-score CV-to-penalty gain (§4.7).
    pub stability_k: f64,
    pub default_tag_importance: crate::types::TagImportance,
    pub problem_tags_top_n: usize,
    pub alarm_penalties: AlarmScorePenalties,
    pub alarm_consider_duration: bool,
    pub alarm_duration_factor_per_hour: f64,
    pub alarm_duration_max_multiplier: f64,
    /// Floor the alarm sub-score is clamped to after penalties (§4.7).
    pub alarm_score_min: f64,
}

impl Default for HealthAssessmentConfig {
    fn default() -> Self {
        Self {
            weights: HealthWeights::default(),
            level_thresholds: HealthLevelThresholds::default(),
            default_window_minutes: d::HEALTH_DEFAULT_WINDOW_MINUTES,
            min_sample_count: d::HEALTH_MIN_SAMPLE_COUNT,
            trend_k: d::HEALTH_TREND_K,
            stability_k: d::HEALTH_STABILITY_K,
            default_tag_importance: crate::types::TagImportance::Minor,
            problem_tags_top_n: d::HEALTH_PROBLEM_TAGS_TOP_N,
            alarm_penalties: AlarmScorePenalties::default(),
            alarm_consider_duration: d::HEALTH_CONSIDER_ALARM_DURATION,
            alarm_duration_factor_per_hour: d::ALARM_DURATION_FACTOR_PER_HOUR,
            alarm_duration_max_multiplier: d::ALARM_DURATION_MAX_MULTIPLIER,
            alarm_score_min: d::ALARM_SCORE_MIN,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleAnalyzerConfig {
    pub angle_threshold_deg: f64,
    pub min_cycle_duration_s: f64,
    pub max_cycle_duration_s: f64,
    pub anomaly_weight_deviation: f64,
    pub anomaly_weight_balance: f64,
    pub anomaly_weight_duration: f64,
    pub anomaly_threshold: f64,
}

impl Default for CycleAnalyzerConfig {
    fn default() -> Self {
        Self {
            angle_threshold_deg: d::CYCLE_ANGLE_THRESHOLD_DEG,
            min_cycle_duration_s: d::CYCLE_MIN_DURATION_S,
            max_cycle_duration_s: d::CYCLE_MAX_DURATION_S,
            anomaly_weight_deviation: d::CYCLE_ANOMALY_WEIGHT_DEVIATION,
            anomaly_weight_balance: d::CYCLE_ANOMALY_WEIGHT_BALANCE,
            anomaly_weight_duration: d::CYCLE_ANOMALY_WEIGHT_DURATION,
            anomaly_threshold: d::CYCLE_ANOMALY_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradationDetectionConfig {
    pub noise_filter_window_hours: u64,
    pub detection_window_days: u64,
    pub rate_threshold_pct_per_day: f64,
    pub confirmation_count: u32,
}

impl Default for DegradationDetectionConfig {
    fn default() -> Self {
        Self {
            noise_filter_window_hours: d::DEGRADATION_NOISE_FILTER_WINDOW_HOURS,
            detection_window_days: d::DEGRADATION_DETECTION_WINDOW_DAYS,
            rate_threshold_pct_per_day: d::DEGRADATION_RATE_THRESHOLD_PCT_PER_DAY,
            confirmation_count: d::DEGRADATION_CONFIRMATION_COUNT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DynamicBaselineConfig {
    pub incremental_weight: f64,
    pub anomaly_filter_threshold: f64,
    pub min_sample_count: u64,
    pub aging_factor: f64,
    pub reservoir_size: usize,
    pub fft_window_samples: usize,
    pub fundamental_freq_min_hz: f64,
    pub fundamental_freq_max_hz: f64,
    pub frequency_harmonics: usize,
}

impl Default for DynamicBaselineConfig {
    fn default() -> Self {
        Self {
            incremental_weight: d::BASELINE_INCREMENTAL_WEIGHT,
            anomaly_filter_threshold: d::BASELINE_ANOMALY_FILTER_THRESHOLD,
            min_sample_count: d::BASELINE_MIN_SAMPLE_COUNT,
            aging_factor: d::BASELINE_AGING_FACTOR,
            reservoir_size: d::BASELINE_RESERVOIR_SIZE,
            fft_window_samples: d::FFT_WINDOW_SAMPLES,
            fundamental_freq_min_hz: d::FUNDAMENTAL_FREQ_MIN_HZ,
            fundamental_freq_max_hz: d::FUNDAMENTAL_FREQ_MAX_HZ,
            frequency_harmonics: d::FREQUENCY_HARMONICS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiScaleConfig {
    pub short_term_minutes: u64,
    pub medium_term_minutes: u64,
    pub long_term_minutes: u64,
    pub short_weight: f64,
    pub medium_weight: f64,
    pub long_weight: f64,
}

impl Default for MultiScaleConfig {
    fn default() -> Self {
        Self {
            short_term_minutes: d::MULTISCALE_SHORT_MINUTES,
            medium_term_minutes: d::MULTISCALE_MEDIUM_MINUTES,
            long_term_minutes: d::MULTISCALE_LONG_MINUTES,
            short_weight: d::MULTISCALE_SHORT_WEIGHT,
            medium_weight: d::MULTISCALE_MEDIUM_WEIGHT,
            long_weight: d::MULTISCALE_LONG_WEIGHT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendPredictionConfig {
    pub history_window_hours: u64,
    pub prediction_horizon_hours: u64,
    pub smoothing_alpha: f64,
    pub confidence_threshold: f64,
}

impl Default for TrendPredictionConfig {
    fn default() -> Self {
        Self {
            history_window_hours: d::TREND_HISTORY_WINDOW_HOURS,
            prediction_horizon_hours: d::TREND_PREDICTION_HORIZON_HOURS,
            smoothing_alpha: d::TREND_SMOOTHING_ALPHA,
            confidence_threshold: d::TREND_CONFIDENCE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RulModelKind {
    Linear,
    Exponential,
    Weibull,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulPredictionConfig {
    pub failure_threshold: f64,
    pub model_type: RulModelKind,
    pub history_window_days: u64,
    pub avg_repair_lead_hours: f64,
}

impl Default for RulPredictionConfig {
    fn default() -> Self {
        Self {
            failure_threshold: d::RUL_FAILURE_THRESHOLD,
            model_type: RulModelKind::Linear,
            history_window_days: d::RUL_HISTORY_WINDOW_DAYS,
            avg_repair_lead_hours: d::RUL_AVG_REPAIR_LEAD_HOURS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataCleanupConfig {
    pub telemetry_retention_days: u64,
    pub telemetry_1m_retention_days: u64,
    pub telemetry_1h_retention_days: u64,
    pub alarm_retention_days: u64,
    pub audit_log_retention_days: u64,
    pub cleanup_interval_hours: u64,
    pub aggregation_interval_secs: u64,
    pub minute_bucket_ms: i64,
    pub hour_bucket_ms: i64,
    pub vacuum_threshold: u64,
}

impl Default for DataCleanupConfig {
    fn default() -> Self {
        Self {
            telemetry_retention_days: d::TELEMETRY_RETENTION_DAYS,
            telemetry_1m_retention_days: d::TELEMETRY_1M_RETENTION_DAYS,
            telemetry_1h_retention_days: d::TELEMETRY_1H_RETENTION_DAYS,
            alarm_retention_days: d::ALARM_RETENTION_DAYS,
            audit_log_retention_days: d::AUDIT_LOG_RETENTION_DAYS,
            cleanup_interval_hours: d::CLEANUP_INTERVAL_HOURS,
            aggregation_interval_secs: d::RETENTION_AGGREGATION_INTERVAL_SECS,
            minute_bucket_ms: d::MINUTE_BUCKET_MS,
            hour_bucket_ms: d::HOUR_BUCKET_MS,
            vacuum_threshold: d::CLEANUP_VACUUM_THRESHOLD,
        }
    }
}

/// The full operator-tunable configuration tree. Unknown TOML keys are
/// tolerated (serde ignores them); `config::watcher` reloads this in place
/// behind an `ArcSwap` when the backing file changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantConfig {
    pub edge: EdgeConfig,
    pub processing: ProcessingConfig,
    pub store_forward: StoreForwardConfig,
    pub network: NetworkConfig,
    pub health_assessment: HealthAssessmentConfig,
    pub dynamic_baseline: DynamicBaselineConfig,
    pub multi_scale: MultiScaleConfig,
    pub trend_prediction: TrendPredictionConfig,
    pub rul_prediction: RulPredictionConfig,
    pub data_cleanup: DataCleanupConfig,
    pub cycle_analyzer: CycleAnalyzerConfig,
    pub degradation: DegradationDetectionConfig,
}

impl PlantConfig {
    /// Load order: `INTELLIMAINT_CONFIG` env var path, then
    /// `plant_config.toml` in the working directory, then built-in defaults.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var("INTELLIMAINT_CONFIG") {
            match Self::from_file(&path) {
                Ok(cfg) => {
                    tracing::info!(path, "loaded plant config from INTELLIMAINT_CONFIG");
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(path, error = %e, "failed to load INTELLIMAINT_CONFIG, trying default path");
                }
            }
        }

        if Path::new("plant_config.toml").exists() {
            match Self::from_file("plant_config.toml") {
                Ok(cfg) => {
                    tracing::info!("loaded plant config from ./plant_config.toml");
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to parse ./plant_config.toml, using defaults");
                }
            }
        }

        tracing::info!("no config file found, using built-in defaults");
        Self::default()
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg: Self = toml::from_str(&text)?;
        Ok(cfg)
    }
}
