//! Degradation detection (§4.8): moving-average noise filter, daily
//! percent-change slope, and a confirmation-count gate before a tag is
//! declared degrading. Ground: the teacher's `ml_engine/dysfunction_filter.rs`
//! sustained-deviation counter, generalized from a single WITS channel to
//! any `(device, tag)` pair.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::DegradationDetectionConfig;
use crate::error::PrognosticsError;
use crate::stats::linear_regression;
use crate::store::TelemetryStore;
use crate::types::{DegradationEvent, DegradationType};

const MS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, Clone, Copy, Default)]
struct Tracker {
    consecutive: u32,
    last_kind: Option<DegradationType>,
}

/// Stateful per-`(device, tag)` degradation tracker. One instance is shared
/// across evaluation ticks so the confirmation counter persists between
/// calls the way the threshold alarm's `first_true_ts` does.
pub struct DegradationDetector {
    cfg: DegradationDetectionConfig,
    trackers: Mutex<HashMap<(u64, u64), Tracker>>,
}

impl DegradationDetector {
    pub fn new(cfg: DegradationDetectionConfig) -> Self {
        Self { cfg, trackers: Mutex::new(HashMap::new()) }
    }

    /// Evaluate one `(device_id, tag_id)` against its recent history. Returns
    /// `Some(DegradationEvent)` only on the evaluation that satisfies
    /// `ConfirmationCount` consecutive degrading readings; readings that
    /// fall back under threshold reset the counter.
    pub fn evaluate(
        &self,
        store: &TelemetryStore,
        device_id: u64,
        tag_id: u64,
        now_ms: i64,
    ) -> Result<Option<DegradationEvent>, PrognosticsError> {
        let start_ts = now_ms - (self.cfg.detection_window_days as i64) * MS_PER_DAY as i64;
        let samples = store.history_values(device_id, tag_id, start_ts, now_ms);
        let samples = samples.value.unwrap_or_default();
        if samples.len() < 2 {
            return Err(PrognosticsError::InsufficientHistory { have: samples.len(), need: 2 });
        }

        let smoothed = moving_average(&samples, (self.cfg.noise_filter_window_hours as i64) * 3_600_000);
        let kind = classify(&smoothed, self.cfg.rate_threshold_pct_per_day);

        let mut trackers = self.trackers.lock().unwrap_or_else(|e| e.into_inner());
        let tracker = trackers.entry((device_id, tag_id)).or_default();

        let (kind, rate) = match kind {
            Some(pair) => pair,
            None => {
                *tracker = Tracker::default();
                return Ok(None);
            }
        };

        if tracker.last_kind == Some(kind) {
            tracker.consecutive += 1;
        } else {
            tracker.last_kind = Some(kind);
            tracker.consecutive = 1;
        }

        if tracker.consecutive < self.cfg.confirmation_count {
            return Ok(None);
        }

        let consecutive = tracker.consecutive;
        Ok(Some(DegradationEvent {
            device_id,
            tag_id,
            ts: now_ms,
            degradation_type: kind,
            rate_pct_per_day: rate,
            consecutive_confirmations: consecutive,
        }))
    }
}

/// Classify the smoothed series into a degradation type plus its measured
/// rate, or `None` if neither the mean trend nor the residual-variance
/// trend clears the configured threshold.
fn classify(smoothed: &[(i64, f64)], rate_threshold_pct_per_day: f64) -> Option<(DegradationType, f64)> {
    let t0 = smoothed[0].0;
    let xs_days: Vec<f64> = smoothed.iter().map(|(ts, _)| (ts - t0) as f64 / MS_PER_DAY).collect();
    let ys: Vec<f64> = smoothed.iter().map(|(_, v)| *v).collect();

    let fit = linear_regression(&xs_days, &ys)?;
    let mean_val = ys.iter().sum::<f64>() / ys.len() as f64;
    let rate_pct_per_day = if mean_val.abs() > 1e-9 {
        fit.slope / mean_val * 100.0
    } else {
        fit.slope
    };

    if rate_pct_per_day.abs() >= rate_threshold_pct_per_day {
        let kind = if rate_pct_per_day > 0.0 { DegradationType::GradualIncrease } else { DegradationType::GradualDecrease };
        return Some((kind, rate_pct_per_day));
    }

    if let Some((variance_fit, residual_rate)) = residual_variance_trend(&xs_days, &ys, &fit) {
        if variance_fit.slope > 0.0 && variance_fit.r_squared > 0.3 {
            return Some((DegradationType::IncreasingVariance, residual_rate));
        }
    }

    None
}

/// Fit a trend line over per-bucket residual standard deviation (residual
/// against the mean-trend line), reported as the standard-deviation's own
/// rate of change per day.
fn residual_variance_trend(
    xs_days: &[f64],
    ys: &[f64],
    mean_fit: &crate::stats::LinearFit,
) -> Option<(crate::stats::LinearFit, f64)> {
    const BUCKETS: usize = 8;
    if xs_days.len() < BUCKETS * 2 {
        return None;
    }
    let span = xs_days.last()? - xs_days.first()?;
    if span <= 0.0 {
        return None;
    }
    let bucket_width = span / BUCKETS as f64;
    let t0 = xs_days[0];

    let mut bucket_values: Vec<Vec<f64>> = vec![Vec::new(); BUCKETS];
    for (i, &x) in xs_days.iter().enumerate() {
        let residual = ys[i] - mean_fit.predict(x);
        let idx = (((x - t0) / bucket_width) as usize).min(BUCKETS - 1);
        bucket_values[idx].push(residual);
    }

    let mut bucket_days = Vec::new();
    let mut bucket_stds = Vec::new();
    for (i, values) in bucket_values.iter().enumerate() {
        if values.len() < 2 {
            continue;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() as f64 - 1.0);
        bucket_days.push(t0 + (i as f64 + 0.5) * bucket_width);
        bucket_stds.push(var.sqrt());
    }

    let fit = linear_regression(&bucket_days, &bucket_stds)?;
    Some((fit, fit.slope))
}

/// Simple trailing moving average over `window_ms`, preserving the original
/// timestamp so the smoothed series can still be regressed against time.
fn moving_average(samples: &[(i64, f64)], window_ms: i64) -> Vec<(i64, f64)> {
    let mut out = Vec::with_capacity(samples.len());
    let mut start = 0usize;
    for i in 0..samples.len() {
        let (ts, _) = samples[i];
        while samples[start].0 < ts - window_ms {
            start += 1;
        }
        let slice = &samples[start..=i];
        let mean = slice.iter().map(|(_, v)| *v).sum::<f64>() / slice.len() as f64;
        out.push((ts, mean));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TelemetryPoint, Value};

    fn cfg() -> DegradationDetectionConfig {
        DegradationDetectionConfig {
            noise_filter_window_hours: 1,
            detection_window_days: 7,
            rate_threshold_pct_per_day: 1.0,
            confirmation_count: 2,
        }
    }

    fn open_temp() -> TelemetryStore {
        let dir = tempfile::tempdir().unwrap();
        TelemetryStore::open(dir.path()).unwrap()
    }

    fn seed(store: &TelemetryStore, device_id: u64, tag_id: u64, values: &[(i64, f64)]) {
        let points: Vec<_> = values
            .iter()
            .enumerate()
            .map(|(i, &(ts, v))| TelemetryPoint {
                device_id,
                tag_id,
                ts,
                seq: i as u64,
                value: Value::F64(v),
                quality: 192,
                protocol: "sim".into(),
                source: "test".into(),
            })
            .collect();
        store.append_batch(&points);
    }

    #[test]
    fn sustained_increase_confirms_after_enough_evaluations() {
        let store = open_temp();
        let values: Vec<(i64, f64)> = (0..7 * 24).map(|h| (h * 3_600_000, 100.0 + h as f64 * 0.5)).collect();
        seed(&store, 1, 10, &values);
        let detector = DegradationDetector::new(cfg());
        let now = 7 * 24 * 3_600_000 - 1;

        let first = detector.evaluate(&store, 1, 10, now).unwrap();
        assert!(first.is_none());
        let second = detector.evaluate(&store, 1, 10, now).unwrap();
        assert!(second.is_some());
        let event = second.unwrap();
        assert_eq!(event.degradation_type, DegradationType::GradualIncrease);
        assert!(event.rate_pct_per_day > 0.0);
    }

    #[test]
    fn flat_series_never_degrades() {
        let store = open_temp();
        let values: Vec<(i64, f64)> = (0..7 * 24).map(|h| (h * 3_600_000, 100.0)).collect();
        seed(&store, 1, 10, &values);
        let detector = DegradationDetector::new(cfg());
        let now = 7 * 24 * 3_600_000 - 1;
        assert!(detector.evaluate(&store, 1, 10, now).unwrap().is_none());
        assert!(detector.evaluate(&store, 1, 10, now).unwrap().is_none());
    }

    #[test]
    fn insufficient_history_is_an_error() {
        let store = open_temp();
        let detector = DegradationDetector::new(cfg());
        assert!(detector.evaluate(&store, 1, 10, 1_000).is_err());
    }
}
