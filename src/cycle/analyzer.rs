//! Cycle analyzer (§4.5): fetches an angle series over a time range, detects
//! cycles via a pluggable `CycleFeatureExtractor`, scores each cycle against
//! a learned `CycleDeviceBaseline`, and maintains that baseline.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use tracing::info;

use crate::error::OperationResult;
use crate::stats::quadratic_regression;
use crate::store::TelemetryStore;
use crate::types::{
    AngleBucketStats, CycleAnomalyType, CycleDeviceBaseline, PageToken, SortDir, WorkCycle,
};

use super::extractor::{AngleCrossingExtractor, CycleFeatureExtractor};

const FETCH_PAGE_SIZE: usize = 2_000;

pub struct CycleAnalyzer {
    extractor: Box<dyn CycleFeatureExtractor>,
    baselines: Mutex<HashMap<u64, CycleDeviceBaseline>>,
}

impl CycleAnalyzer {
    pub fn new() -> Self {
        let cfg = crate::config::get().cycle_analyzer;
        Self {
            extractor: Box::new(AngleCrossingExtractor {
                angle_threshold: cfg.angle_threshold_deg,
            }),
            baselines: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_extractor(extractor: Box<dyn CycleFeatureExtractor>) -> Self {
        Self {
            extractor,
            baselines: Mutex::new(HashMap::new()),
        }
    }

    pub fn baseline(&self, device_id: u64) -> Option<CycleDeviceBaseline> {
        self.baselines.lock().unwrap().get(&device_id).cloned()
    }

    pub fn set_baseline(&self, baseline: CycleDeviceBaseline) {
        self.baselines.lock().unwrap().insert(baseline.device_id, baseline);
    }

    /// Detect and score cycles for `device_id` over `[start_ts, end_ts]`,
    /// reading the angle and motor-current series from `store`.
    pub fn analyze_range(
        &self,
        store: &TelemetryStore,
        device_id: u64,
        segment_id: Option<u64>,
        angle_tag: u64,
        motor1_tag: u64,
        motor2_tag: u64,
        start_ts: i64,
        end_ts: i64,
    ) -> OperationResult<Vec<WorkCycle>> {
        let angle_series = match fetch_series(store, device_id, angle_tag, start_ts, end_ts) {
            Ok(s) => s,
            Err(e) => return e,
        };
        if angle_series.len() < 2 {
            return OperationResult::ok(Vec::new());
        }
        let motor1_series = match fetch_series(store, device_id, motor1_tag, start_ts, end_ts) {
            Ok(s) => s,
            Err(e) => return e,
        };
        let motor2_series = match fetch_series(store, device_id, motor2_tag, start_ts, end_ts) {
            Ok(s) => s,
            Err(e) => return e,
        };

        let cfg = crate::config::get().cycle_analyzer;
        let bounds = self.extractor.find_cycles(&angle_series, cfg.min_cycle_duration_s, cfg.max_cycle_duration_s);
        let baseline = self.baseline(device_id);

        let cycles = bounds
            .into_iter()
            .map(|b| {
                score_cycle(
                    device_id,
                    segment_id,
                    &angle_series,
                    &motor1_series,
                    &motor2_series,
                    b,
                    baseline.as_ref(),
                    &cfg,
                )
            })
            .collect();
        OperationResult::ok(cycles)
    }

    /// Fit the quadratic current-vs-angle baseline and per-degree bucket
    /// statistics from `(angle, avg_current)` sample pairs collected across
    /// many historical cycles.
    pub fn learn_baseline(&self, device_id: u64, samples: &[(f64, f64)]) -> Option<CycleDeviceBaseline> {
        if samples.len() < 3 {
            return None;
        }
        let xs: Vec<f64> = samples.iter().map(|(a, _)| *a).collect();
        let ys: Vec<f64> = samples.iter().map(|(_, c)| *c).collect();
        let (poly_coeffs, r_squared) = quadratic_regression(&xs, &ys)?;

        let mut buckets: BTreeMap<i32, Vec<f64>> = BTreeMap::new();
        for &(angle, current) in samples {
            buckets.entry(angle.round() as i32).or_default().push(current);
        }
        let angle_buckets = buckets
            .into_iter()
            .map(|(angle, values)| {
                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n.max(1.0);
                let stats = AngleBucketStats {
                    mean,
                    std: variance.sqrt(),
                    min: values.iter().cloned().fold(f64::INFINITY, f64::min),
                    max: values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                    count: values.len() as u64,
                };
                (angle, stats)
            })
            .collect();

        let baseline = CycleDeviceBaseline {
            device_id,
            poly_coeffs,
            r_squared,
            angle_buckets,
            sample_count: samples.len() as u64,
        };
        info!(device_id, r_squared, samples = samples.len(), "cycle baseline learned");
        self.set_baseline(baseline.clone());
        Some(baseline)
    }
}

impl Default for CycleAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn score_cycle(
    device_id: u64,
    segment_id: Option<u64>,
    angle_series: &[(i64, f64)],
    motor1_series: &[(i64, f64)],
    motor2_series: &[(i64, f64)],
    bounds: super::extractor::CycleBounds,
    baseline: Option<&CycleDeviceBaseline>,
    cfg: &crate::config::CycleAnalyzerConfig,
) -> WorkCycle {
    let duration_s = (bounds.end_ts - bounds.start_ts) as f64 / 1000.0;

    let m1_window = window(motor1_series, bounds.start_ts, bounds.end_ts);
    let m2_window = window(motor2_series, bounds.start_ts, bounds.end_ts);
    let (motor1_peak, motor1_avg) = peak_avg(&m1_window);
    let (motor2_peak, motor2_avg) = peak_avg(&m2_window);

    let energy = trapezoidal_energy(&m1_window) + trapezoidal_energy(&m2_window);
    let balance_ratio = if motor2_avg.abs() > 1e-9 { motor1_avg / motor2_avg } else { 1.0 };

    let angle_window = window(angle_series, bounds.start_ts, bounds.end_ts);
    let baseline_deviation_pct = baseline
        .map(|b| deviation_against_baseline(b, &angle_window, &m1_window))
        .unwrap_or(0.0);

    let deviation_component = baseline_deviation_pct.abs().min(100.0);
    let balance_component = ((balance_ratio - 1.0).abs() * 100.0).min(100.0);
    let duration_component = duration_deviation_pct(duration_s, cfg.min_cycle_duration_s, cfg.max_cycle_duration_s);

    let anomaly_score = (cfg.anomaly_weight_deviation * deviation_component
        + cfg.anomaly_weight_balance * balance_component
        + cfg.anomaly_weight_duration * duration_component)
        .clamp(0.0, 100.0);
    let is_anomaly = anomaly_score >= cfg.anomaly_threshold;

    let anomaly_type = if !is_anomaly {
        None
    } else if duration_s > cfg.max_cycle_duration_s {
        Some(CycleAnomalyType::CycleTimeout)
    } else if duration_s < cfg.min_cycle_duration_s {
        Some(CycleAnomalyType::CycleTooShort)
    } else if balance_component >= deviation_component && balance_component >= duration_component {
        Some(CycleAnomalyType::MotorImbalance)
    } else if deviation_component >= duration_component {
        if motor1_avg.max(motor2_avg) > baseline.map(|b| b.poly_coeffs.2 * 1.5).unwrap_or(f64::INFINITY) {
            Some(CycleAnomalyType::OverCurrent)
        } else {
            Some(CycleAnomalyType::BaselineDeviation)
        }
    } else {
        Some(CycleAnomalyType::AngleStall)
    };

    WorkCycle {
        device_id,
        segment_id,
        start: bounds.start_ts,
        end: bounds.end_ts,
        duration_s,
        max_angle: bounds.peak_value,
        motor1_peak,
        motor1_avg,
        motor2_peak,
        motor2_avg,
        energy,
        balance_ratio,
        baseline_deviation_pct,
        anomaly_score,
        is_anomaly,
        anomaly_type,
    }
}

fn window(series: &[(i64, f64)], start_ts: i64, end_ts: i64) -> Vec<(i64, f64)> {
    series
        .iter()
        .filter(|(ts, _)| *ts >= start_ts && *ts <= end_ts)
        .copied()
        .collect()
}

fn peak_avg(series: &[(i64, f64)]) -> (f64, f64) {
    if series.is_empty() {
        return (0.0, 0.0);
    }
    let peak = series.iter().map(|(_, v)| *v).fold(f64::NEG_INFINITY, f64::max);
    let avg = series.iter().map(|(_, v)| *v).sum::<f64>() / series.len() as f64;
    (peak, avg)
}

/// Trapezoidal integral of current over time, in amp-seconds.
fn trapezoidal_energy(series: &[(i64, f64)]) -> f64 {
    if series.len() < 2 {
        return 0.0;
    }
    series
        .windows(2)
        .map(|w| {
            let (t0, v0) = w[0];
            let (t1, v1) = w[1];
            let dt = (t1 - t0) as f64 / 1000.0;
            0.5 * (v0 + v1) * dt
        })
        .sum()
}

fn deviation_against_baseline(baseline: &CycleDeviceBaseline, angle_window: &[(i64, f64)], current_window: &[(i64, f64)]) -> f64 {
    if angle_window.is_empty() || current_window.is_empty() {
        return 0.0;
    }
    let avg_angle = angle_window.iter().map(|(_, v)| *v).sum::<f64>() / angle_window.len() as f64;
    let avg_current = current_window.iter().map(|(_, v)| *v).sum::<f64>() / current_window.len() as f64;
    let predicted = baseline.predict(avg_angle);
    if predicted.abs() < 1e-9 {
        return 0.0;
    }
    (avg_current - predicted) / predicted * 100.0
}

fn duration_deviation_pct(duration_s: f64, min_s: f64, max_s: f64) -> f64 {
    let nominal = (min_s + max_s) / 2.0;
    if nominal <= 0.0 {
        return 0.0;
    }
    ((duration_s - nominal).abs() / nominal * 100.0).min(100.0)
}

fn fetch_series(
    store: &TelemetryStore,
    device_id: u64,
    tag_id: u64,
    start_ts: i64,
    end_ts: i64,
) -> Result<Vec<(i64, f64)>, OperationResult<Vec<WorkCycle>>> {
    let mut out = Vec::new();
    let mut after: Option<PageToken> = None;
    loop {
        let query = crate::types::HistoryQuery {
            device_id,
            tag_id: Some(tag_id),
            start_ts,
            end_ts,
            sort: SortDir::Asc,
            limit: FETCH_PAGE_SIZE,
            after: after.clone(),
        };
        let result = store.query(&query);
        let page = match result.value {
            Some(page) => page,
            None => {
                return Err(OperationResult::fail(
                    result.error_code.unwrap_or(crate::error::ErrorCode::DbUnavailable),
                    result.error_message.unwrap_or_else(|| "cycle analyzer series fetch failed".into()),
                ));
            }
        };
        for point in &page.items {
            if let Some(v) = point.value.as_f64() {
                out.push((point.ts, v));
            }
        }
        if !page.has_more {
            break;
        }
        after = page.next_token;
        if after.is_none() {
            break;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline() -> CycleDeviceBaseline {
        CycleDeviceBaseline {
            device_id: 1,
            poly_coeffs: (0.0, 0.0, 50.0),
            r_squared: 0.9,
            angle_buckets: BTreeMap::new(),
            sample_count: 10,
        }
    }

    #[test]
    fn scores_normal_cycle_as_not_anomalous() {
        let analyzer = CycleAnalyzer::new();
        analyzer.set_baseline(baseline());
        let angle: Vec<(i64, f64)> = vec![(0, 0.0), (1000, 10.0), (2000, 30.0), (3000, 4.0), (4000, 0.0)];
        let motor1: Vec<(i64, f64)> = vec![(0, 48.0), (1000, 49.0), (2000, 50.0), (3000, 49.0), (4000, 48.0)];
        let motor2 = motor1.clone();
        let cfg = crate::config::get().cycle_analyzer;
        let bounds = analyzer.extractor.find_cycles(&angle, cfg.min_cycle_duration_s, cfg.max_cycle_duration_s);
        assert_eq!(bounds.len(), 1);
        let cycle = score_cycle(1, None, &angle, &motor1, &motor2, bounds[0], analyzer.baseline(1).as_ref(), &cfg);
        assert!(!cycle.is_anomaly);
        assert!(cycle.anomaly_score < cfg.anomaly_threshold);
    }

    #[test]
    fn motor_imbalance_flagged_when_currents_diverge() {
        let analyzer = CycleAnalyzer::new();
        analyzer.set_baseline(baseline());
        let angle: Vec<(i64, f64)> = vec![(0, 0.0), (1000, 10.0), (2000, 30.0), (3000, 4.0), (4000, 0.0)];
        let motor1: Vec<(i64, f64)> = vec![(0, 48.0), (1000, 49.0), (2000, 100.0), (3000, 99.0), (4000, 48.0)];
        let motor2: Vec<(i64, f64)> = vec![(0, 10.0), (1000, 11.0), (2000, 10.0), (3000, 11.0), (4000, 10.0)];
        let cfg = crate::config::get().cycle_analyzer;
        let bounds = analyzer.extractor.find_cycles(&angle, cfg.min_cycle_duration_s, cfg.max_cycle_duration_s);
        let cycle = score_cycle(1, None, &angle, &motor1, &motor2, bounds[0], analyzer.baseline(1).as_ref(), &cfg);
        assert!(cycle.is_anomaly);
    }

    #[test]
    fn learn_baseline_fits_quadratic() {
        let analyzer = CycleAnalyzer::new();
        let samples: Vec<(f64, f64)> = (-20..=20).map(|a| (a as f64, 0.01 * (a as f64).powi(2) + 50.0)).collect();
        let baseline = analyzer.learn_baseline(7, &samples).unwrap();
        assert_eq!(baseline.device_id, 7);
        assert!(baseline.r_squared > 0.9);
        assert!(!baseline.angle_buckets.is_empty());
    }
}
