//! Deadband + outlier filtering, applied synchronously in the caller's
//! thread before a point ever reaches the bounded send channel.

use std::collections::HashMap;
use std::sync::Mutex;

use arc_swap::ArcSwap;

use crate::config::OutlierAction;
use crate::stats::Welford;
use crate::types::TelemetryPoint;

/// Per-tag override of the plant-wide deadband defaults. `bypass` sends
/// every point through regardless of deadband or outlier checks — used for
/// tags an operator is actively diagnosing.
#[derive(Debug, Clone, Default)]
pub struct TagProcessingConfig {
    pub deadband: Option<f64>,
    pub deadband_percent: Option<f64>,
    pub bypass: bool,
}

/// Result of running a point through the preprocessor.
#[derive(Debug, Clone)]
pub enum FilterOutcome {
    /// Forward this point (quality may have been degraded by a Mark action).
    Emit(TelemetryPoint),
    /// Within deadband of the last emitted value — not forwarded.
    Suppressed,
    /// An outlier under the configured `Drop` action — not forwarded.
    Dropped,
}

/// OPC-style quality used to flag (but still forward) a point whose
/// magnitude looks statistically anomalous under `OutlierAction::Mark`.
pub const QUALITY_UNCERTAIN: i32 = 64;

#[derive(Debug, Default)]
struct TagState {
    last_emitted_value: Option<f64>,
    last_emitted_ts: i64,
    stats: Welford,
}

/// Running totals exposed for observability (§4.2's `filter_rate`).
#[derive(Debug, Default)]
pub struct FilterCounters {
    pub observed: std::sync::atomic::AtomicU64,
    pub filtered: std::sync::atomic::AtomicU64,
}

impl FilterCounters {
    pub fn filter_rate(&self) -> f64 {
        let observed = self.observed.load(std::sync::atomic::Ordering::Relaxed);
        if observed == 0 {
            return 0.0;
        }
        let filtered = self.filtered.load(std::sync::atomic::Ordering::Relaxed);
        filtered as f64 / observed as f64
    }
}

/// Stateful per-tag deadband/outlier filter. Cheap to clone — internal state
/// is behind `Arc`-free interior mutability (`Mutex`) since the struct itself
/// is always held behind an `Arc` by its owner.
pub struct Preprocessor {
    state: Mutex<HashMap<(u64, u64), TagState>>,
    overrides: ArcSwap<HashMap<u64, TagProcessingConfig>>,
    pub counters: FilterCounters,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
            overrides: ArcSwap::from_pointee(HashMap::new()),
            counters: FilterCounters::default(),
        }
    }

    pub fn set_overrides(&self, overrides: HashMap<u64, TagProcessingConfig>) {
        self.overrides.store(std::sync::Arc::new(overrides));
    }

    /// Filter one point against the current plant config and any per-tag
    /// override. `now` is passed in (rather than read from the clock
    /// internally) so tests can drive deterministic timelines.
    pub fn filter(&self, point: TelemetryPoint, now: i64) -> FilterOutcome {
        self.counters.observed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

        let Some(value) = point.value.as_f64() else {
            // Non-numeric values (strings, byte arrays) bypass deadband and
            // outlier logic entirely — there is no meaningful distance metric.
            return FilterOutcome::Emit(point);
        };

        let overrides = self.overrides.load();
        let tag_override = overrides.get(&point.tag_id);
        if tag_override.map(|o| o.bypass).unwrap_or(false) {
            return FilterOutcome::Emit(point);
        }

        let cfg = crate::config::get();
        let key = (point.device_id, point.tag_id);
        let mut states = self.state.lock().unwrap();
        let state = states.entry(key).or_default();

        let outlier = state.stats.z_score(value).map(|z| z.abs() > cfg.processing.outlier_sigma_threshold);
        state.stats.update(value);

        if outlier.unwrap_or(false) {
            self.counters.filtered.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return match cfg.processing.outlier_action {
                OutlierAction::Drop => FilterOutcome::Dropped,
                OutlierAction::Pass => {
                    state.last_emitted_value = Some(value);
                    state.last_emitted_ts = now;
                    FilterOutcome::Emit(point)
                }
                OutlierAction::Mark => {
                    let mut marked = point;
                    marked.quality = QUALITY_UNCERTAIN;
                    state.last_emitted_value = Some(value);
                    state.last_emitted_ts = now;
                    FilterOutcome::Emit(marked)
                }
            };
        }

        let forced = now.saturating_sub(state.last_emitted_ts) as u64 >= cfg.processing.force_upload_interval_ms;

        if let (Some(last), false) = (state.last_emitted_value, forced) {
            let abs_band = tag_override
                .and_then(|o| o.deadband)
                .unwrap_or(cfg.processing.default_deadband);
            let pct_band = tag_override
                .and_then(|o| o.deadband_percent)
                .unwrap_or(cfg.processing.default_deadband_percent);
            let threshold = abs_band.max(pct_band / 100.0 * last.abs());

            if (value - last).abs() <= threshold {
                self.counters.filtered.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return FilterOutcome::Suppressed;
            }
        }

        state.last_emitted_value = Some(value);
        state.last_emitted_ts = now;
        FilterOutcome::Emit(point)
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn point(device_id: u64, tag_id: u64, ts: i64, v: f64) -> TelemetryPoint {
        TelemetryPoint {
            device_id,
            tag_id,
            ts,
            seq: 0,
            value: Value::F64(v),
            quality: 192,
            protocol: "opcua".into(),
            source: "edge-1".into(),
        }
    }

    fn init_config() {
        if !crate::config::is_initialized() {
            crate::config::init(crate::config::PlantConfig::default());
        }
    }

    #[test]
    fn small_delta_is_suppressed() {
        init_config();
        let p = Preprocessor::new();
        assert!(matches!(p.filter(point(1, 1, 0, 10.0), 0), FilterOutcome::Emit(_)));
        assert!(matches!(p.filter(point(1, 1, 100, 10.005), 100), FilterOutcome::Suppressed));
    }

    #[test]
    fn forced_upload_bypasses_deadband() {
        init_config();
        let p = Preprocessor::new();
        p.filter(point(1, 2, 0, 10.0), 0);
        let forced_ts = crate::config::defaults::FORCE_UPLOAD_INTERVAL_MS as i64 + 1;
        assert!(matches!(p.filter(point(1, 2, forced_ts, 10.001), forced_ts), FilterOutcome::Emit(_)));
    }

    #[test]
    fn bypass_override_always_emits() {
        init_config();
        let p = Preprocessor::new();
        let mut overrides = HashMap::new();
        overrides.insert(3u64, TagProcessingConfig { bypass: true, ..Default::default() });
        p.set_overrides(overrides);
        p.filter(point(1, 3, 0, 10.0), 0);
        assert!(matches!(p.filter(point(1, 3, 1, 10.0001), 1), FilterOutcome::Emit(_)));
    }
}
