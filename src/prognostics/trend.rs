//! Trend prediction (§4.8): fit a line and an exponential smoothing over a
//! tag's recent history, project hours until it crosses a threshold, and
//! bin the result into an `AlertLevel`.

use crate::config::TrendPredictionConfig;
use crate::error::PrognosticsError;
use crate::stats::{exponential_smoothing, linear_regression};
use crate::store::TelemetryStore;
use crate::types::{AlertLevel, TrendPrediction};

pub struct TrendPredictor {
    cfg: TrendPredictionConfig,
}

impl TrendPredictor {
    pub fn new(cfg: TrendPredictionConfig) -> Self {
        Self { cfg }
    }

    /// Predict `tag_id`'s trajectory toward `threshold`. `rising` says
    /// whether crossing the threshold from below (true) or above (false)
    /// counts as the failure direction the alert level should react to.
    pub fn predict(
        &self,
        store: &TelemetryStore,
        device_id: u64,
        tag_id: u64,
        threshold: f64,
        rising: bool,
        now_ms: i64,
    ) -> Result<TrendPrediction, PrognosticsError> {
        let start_ts = now_ms - (self.cfg.history_window_hours as i64) * 3_600_000;
        let samples = store.history_values(device_id, tag_id, start_ts, now_ms);
        let samples = samples.value.unwrap_or_default();
        if samples.len() < 2 {
            return Err(PrognosticsError::InsufficientHistory { have: samples.len(), need: 2 });
        }

        let xs_hours: Vec<f64> = samples.iter().map(|(ts, _)| (ts - start_ts) as f64 / 3_600_000.0).collect();
        let ys: Vec<f64> = samples.iter().map(|(_, v)| *v).collect();

        let fit = linear_regression(&xs_hours, &ys);
        let (trend_slope, confidence) = match fit {
            Some(f) => (f.slope, f.r_squared),
            None => (0.0, 0.0),
        };
        let smoothed = exponential_smoothing(&ys, self.cfg.smoothing_alpha).unwrap_or(*ys.last().unwrap());

        let moving_toward = if rising { trend_slope > 0.0 } else { trend_slope < 0.0 };
        let hours_to_threshold = if moving_toward && trend_slope.abs() > 1e-9 {
            let remaining = threshold - smoothed;
            let hours = remaining / trend_slope;
            if hours.is_finite() && hours >= 0.0 {
                Some(hours)
            } else {
                None
            }
        } else {
            None
        };

        let alert_level = if confidence < self.cfg.confidence_threshold {
            AlertLevel::None
        } else {
            match hours_to_threshold {
                Some(h) if h <= 24.0 => AlertLevel::Critical,
                Some(h) if h <= 48.0 => AlertLevel::High,
                Some(h) if h <= 72.0 => AlertLevel::Medium,
                Some(_) => AlertLevel::Low,
                None => AlertLevel::None,
            }
        };

        Ok(TrendPrediction { device_id, tag_id, trend_slope, confidence, hours_to_threshold, alert_level })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TelemetryPoint, Value};

    fn cfg() -> TrendPredictionConfig {
        TrendPredictionConfig {
            history_window_hours: 24,
            prediction_horizon_hours: 72,
            smoothing_alpha: 0.3,
            confidence_threshold: 0.5,
        }
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

    fn open_temp() -> TelemetryStore {
        let dir = tempfile::tempdir().unwrap();
        TelemetryStore::open(dir.path()).unwrap()
    }

    #[test]
    fn rising_trend_projects_hours_to_threshold() {
        let store = open_temp();
        let values: Vec<(i64, f64)> = (0..24).map(|h| (h * 3_600_000, 50.0 + h as f64 * 2.0)).collect();
        seed(&store, 1, 10, &values);
        let predictor = TrendPredictor::new(cfg());
        let prediction = predictor.predict(&store, 1, 10, 150.0, true, 23 * 3_600_000).unwrap();
        assert!(prediction.trend_slope > 0.0);
        assert!(prediction.hours_to_threshold.is_some());
    }

    #[test]
    fn flat_trend_never_reaches_threshold() {
        let store = open_temp();
        let values: Vec<(i64, f64)> = (0..24).map(|h| (h * 3_600_000, 50.0)).collect();
        seed(&store, 1, 10, &values);
        let predictor = TrendPredictor::new(cfg());
        let prediction = predictor.predict(&store, 1, 10, 150.0, true, 23 * 3_600_000).unwrap();
        assert!(prediction.hours_to_threshold.is_none());
        assert_eq!(prediction.alert_level, AlertLevel::None);
    }

    #[test]
    fn insufficient_history_is_an_error() {
        let store = open_temp();
        let predictor = TrendPredictor::new(cfg());
        let result = predictor.predict(&store, 1, 10, 150.0, true, 1000);
        assert!(result.is_err());
    }
}
