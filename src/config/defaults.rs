//! System-wide default constants, centralised here so `PlantConfig`'s
//! `Default` impls and the spec's worked examples agree on one source of
//! truth. Grouped by subsystem for easy discovery.

// ============================================================================
// Edge writer
// ============================================================================

pub const QUEUE_CAPACITY_GLOBAL: usize = 10_000;
pub const WRITER_BATCH_SIZE: usize = 500;
pub const WRITER_FLUSH_MS: u64 = 1_000;
pub const WRITER_MAX_RETRIES: u32 = 5;
pub const WRITER_RETRY_DELAY_MS: u64 = 200;

// ============================================================================
// Edge preprocessor
// ============================================================================

pub const DEFAULT_DEADBAND: f64 = 0.01;
pub const DEFAULT_DEADBAND_PERCENT: f64 = 0.1;
pub const MIN_INTERVAL_MS: u64 = 100;
pub const FORCE_UPLOAD_INTERVAL_MS: u64 = 60_000;
pub const OUTLIER_SIGMA_THRESHOLD: f64 = 4.0;

// ============================================================================
// Store-and-forward
// ============================================================================

pub const MAX_STORE_SIZE_MB: u64 = 500;
pub const STORE_FORWARD_RETENTION_DAYS: u64 = 7;
pub const DEFAULT_MAX_QUEUE_BATCHES: usize = 100;

// ============================================================================
// Network / S&F transport
// ============================================================================

pub const HEALTH_CHECK_INTERVAL_MS: u64 = 5_000;
pub const HEALTH_CHECK_TIMEOUT_MS: u64 = 3_000;
pub const OFFLINE_THRESHOLD: u32 = 3;
pub const SEND_BATCH_SIZE: usize = 200;
pub const SEND_INTERVAL_MS: u64 = 2_000;
pub const CHANNEL_CAPACITY_BATCHES: usize = 100;

// ============================================================================
// Collection rule engine
// ============================================================================

pub const COLLECTION_TICK_MS: u64 = 500;

// ============================================================================
// Alarm evaluator
// ============================================================================

pub const ALARM_RULE_CACHE_REFRESH_SECS: u64 = 30;
pub const ALARM_WRITE_MAX_RETRIES: u32 = 3;

// ============================================================================
// Health assessment
// ============================================================================

pub const HEALTH_WEIGHT_DEVIATION: f64 = 0.35;
pub const HEALTH_WEIGHT_TREND: f64 = 0.25;
pub const HEALTH_WEIGHT_STABILITY: f64 = 0.20;
pub const HEALTH_WEIGHT_ALARM: f64 = 0.20;

pub const HEALTH_LEVEL_HEALTHY_MIN: f64 = 80.0;
pub const HEALTH_LEVEL_ATTENTION_MIN: f64 = 60.0;
pub const HEALTH_LEVEL_WARNING_MIN: f64 = 40.0;

pub const HEALTH_DEFAULT_WINDOW_MINUTES: u64 = 60;
pub const HEALTH_MIN_SAMPLE_COUNT: u64 = 30;

/// Deviation-score slope: `penalty = min(100, z * DEVIATION_Z_SLOPE)`.
pub const DEVIATION_Z_SLOPE: f64 = 20.0;

/// Alarm-score penalty per severity bucket (§4.7).
pub const ALARM_PENALTY_CRITICAL: f64 = 40.0;
pub const ALARM_PENALTY_ERROR: f64 = 25.0;
pub const ALARM_PENALTY_WARNING: f64 = 15.0;
pub const ALARM_PENALTY_INFO: f64 = 5.0;
pub const ALARM_SCORE_MIN: f64 = 0.0;
pub const ALARM_DURATION_FACTOR_PER_HOUR: f64 = 0.05;
pub const ALARM_DURATION_MAX_MULTIPLIER: f64 = 2.0;

// ============================================================================
// Multi-scale health windows
// ============================================================================

pub const MULTISCALE_SHORT_MINUTES: u64 = 5;
pub const MULTISCALE_MEDIUM_MINUTES: u64 = 60;
pub const MULTISCALE_LONG_MINUTES: u64 = 1_440;
pub const MULTISCALE_SHORT_WEIGHT: f64 = 0.4;
pub const MULTISCALE_MEDIUM_WEIGHT: f64 = 0.35;
pub const MULTISCALE_LONG_WEIGHT: f64 = 0.25;

// ============================================================================
// Motor baseline learner
// ============================================================================

pub const BASELINE_INCREMENTAL_WEIGHT: f64 = 0.1;
pub const BASELINE_ANOMALY_FILTER_THRESHOLD: f64 = 3.0;
pub const BASELINE_MIN_SAMPLE_COUNT: u64 = 30;
pub const BASELINE_AGING_FACTOR: f64 = 0.01;
pub const BASELINE_RESERVOIR_SIZE: usize = 2_000;
pub const FFT_WINDOW_SAMPLES: usize = 2_048;
pub const FUNDAMENTAL_FREQ_MIN_HZ: f64 = 45.0;
pub const FUNDAMENTAL_FREQ_MAX_HZ: f64 = 65.0;
pub const FREQUENCY_HARMONICS: usize = 10;

// ============================================================================
// Trend prediction
// ============================================================================

pub const TREND_HISTORY_WINDOW_HOURS: u64 = 24;
pub const TREND_PREDICTION_HORIZON_HOURS: u64 = 72;
pub const TREND_SMOOTHING_ALPHA: f64 = 0.3;
pub const TREND_CONFIDENCE_THRESHOLD: f64 = 0.5;

// ============================================================================
// Degradation detection
// ============================================================================

pub const DEGRADATION_NOISE_FILTER_WINDOW_HOURS: u64 = 6;
pub const DEGRADATION_DETECTION_WINDOW_DAYS: u64 = 7;
pub const DEGRADATION_RATE_THRESHOLD_PCT_PER_DAY: f64 = 1.0;
pub const DEGRADATION_CONFIRMATION_COUNT: u32 = 3;

// ============================================================================
// RUL prediction
// ============================================================================

pub const RUL_FAILURE_THRESHOLD: f64 = 30.0;
pub const RUL_HISTORY_WINDOW_DAYS: u64 = 30;
pub const RUL_AVG_REPAIR_LEAD_HOURS: f64 = 48.0;

// ============================================================================
// Retention & downsampling
// ============================================================================

pub const RETENTION_AGGREGATION_INTERVAL_SECS: u64 = 60;
pub const MINUTE_BUCKET_MS: i64 = 60_000;
pub const HOUR_BUCKET_MS: i64 = 3_600_000;
pub const TELEMETRY_RETENTION_DAYS: u64 = 7;
pub const TELEMETRY_1M_RETENTION_DAYS: u64 = 30;
pub const TELEMETRY_1H_RETENTION_DAYS: u64 = 365;
pub const ALARM_RETENTION_DAYS: u64 = 365;
pub const AUDIT_LOG_RETENTION_DAYS: u64 = 365;
pub const CLEANUP_INTERVAL_HOURS: u64 = 24;
pub const CLEANUP_VACUUM_THRESHOLD: u64 = 10_000;

// ============================================================================
// Cycle analyzer
// ============================================================================

pub const CYCLE_ANOMALY_WEIGHT_DEVIATION: f64 = 0.5;
pub const CYCLE_ANOMALY_WEIGHT_BALANCE: f64 = 0.3;
pub const CYCLE_ANOMALY_WEIGHT_DURATION: f64 = 0.2;
pub const CYCLE_ANOMALY_THRESHOLD: f64 = 60.0;
pub const CYCLE_ANGLE_THRESHOLD_DEG: f64 = 5.0;
pub const CYCLE_MIN_DURATION_S: f64 = 5.0;
pub const CYCLE_MAX_DURATION_S: f64 = 600.0;

// ============================================================================
// Health assessment — subscore tuning and tag importance
// ============================================================================

/// Trend-score slope-to-penalty gain: `score = 100 - min(100, |slope_norm| * k)`.
pub const HEALTH_TREND_K: f64 = 100.0;
/// Stability-score CV-to-penalty gain: `score = 100 * exp(-cv * k_s)`.
pub const HEALTH_STABILITY_K: f64 = 8.0;
pub const HEALTH_PROBLEM_TAGS_TOP_N: usize = 5;
pub const HEALTH_CONSIDER_ALARM_DURATION: bool = true;

// ============================================================================
// DB query timeout
// ============================================================================

pub const DB_QUERY_TIMEOUT_SECS: u64 = 30;
pub const DB_SLOW_LATENCY_MS: u64 = 2_000;
