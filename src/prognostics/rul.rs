//! Remaining useful life estimation (§4.8): fit the configured model to a
//! device health-index time series and project when it crosses
//! `FailureThreshold`. Ground: the teacher's `ml_engine/failure_predictor.rs`
//! linear-trend-to-threshold projection, extended with the log-linearized
//! exponential and Weibull fits the RUL model menu adds.

use crate::config::{RulModelKind, RulPredictionConfig};
use crate::error::PrognosticsError;
use crate::stats::linear_regression;
use crate::types::{RiskLevel, RulEstimate, RulFactor, RulModelType, RulStatus};

const MS_PER_DAY: f64 = 86_400_000.0;
const MS_PER_HOUR: f64 = 3_600_000.0;
/// Minimum samples before a model fit is trusted; below this the estimate
/// is reported with `RulStatus::InsufficientData` rather than an error, since
/// "not enough history yet" is itself a meaningful prognostics status.
const MIN_TRUSTED_SAMPLES: usize = 5;
/// Assumed nominal full-life degradation span used to derive the
/// accelerated-vs-normal boundary: a component that would take a full year
/// to fall from 100 to `FailureThreshold` is degrading at a "normal" rate.
const NOMINAL_LIFETIME_DAYS: f64 = 365.0;

pub struct RulEstimator {
    cfg: RulPredictionConfig,
}

impl RulEstimator {
    pub fn new(cfg: RulPredictionConfig) -> Self {
        Self { cfg }
    }

    /// `history` is the device's health-index series (`ts_ms`, `index`) over
    /// `HistoryWindowDays`, oldest first. `factors` is the set of tags the
    /// caller has already diagnosed as contributing, as `(tag_id, z_score,
    /// delta_slope)` — the estimator only normalizes and signs them, it does
    /// not itself reach into the health or baseline subsystems.
    pub fn estimate(
        &self,
        device_id: u64,
        history: &[(i64, f64)],
        factors: &[(u64, f64, f64)],
        now_ms: i64,
    ) -> Result<RulEstimate, PrognosticsError> {
        if history.len() < 2 {
            return Err(PrognosticsError::InsufficientHistory { have: history.len(), need: 2 });
        }

        let model = match self.cfg.model_type {
            RulModelKind::Linear => RulModelType::Linear,
            RulModelKind::Exponential => RulModelType::Exponential,
            RulModelKind::Weibull => RulModelType::Weibull,
        };

        let current = history.last().unwrap().1;
        let factors_out = build_factors(factors);

        if history.len() < MIN_TRUSTED_SAMPLES {
            return Ok(RulEstimate {
                device_id,
                ts: now_ms,
                model,
                rul_hours: 0.0,
                confidence: 0.0,
                status: RulStatus::InsufficientData,
                risk_level: RiskLevel::Low,
                recommended_maintenance_time: now_ms,
                factors: factors_out,
            });
        }

        let t0 = history[0].0;
        let xs_days: Vec<f64> = history.iter().map(|(ts, _)| (ts - t0) as f64 / MS_PER_DAY).collect();
        let now_day = (now_ms - t0) as f64 / MS_PER_DAY;

        let fit = match model {
            RulModelType::Linear => fit_linear(&xs_days, history, self.cfg.failure_threshold, current, now_day),
            RulModelType::Exponential => fit_exponential(&xs_days, history, self.cfg.failure_threshold, current, now_day),
            RulModelType::Weibull => fit_weibull(&xs_days, history, self.cfg.failure_threshold, current, now_day),
        };

        let Some((rul_days, confidence, slope_per_day)) = fit else {
            return Ok(RulEstimate {
                device_id,
                ts: now_ms,
                model,
                rul_hours: NOMINAL_LIFETIME_DAYS * 24.0,
                confidence: 0.0,
                status: RulStatus::Healthy,
                risk_level: RiskLevel::Low,
                recommended_maintenance_time: now_ms + (NOMINAL_LIFETIME_DAYS * MS_PER_DAY) as i64,
                factors: factors_out,
            });
        };

        let rul_hours = (rul_days * 24.0).max(0.0);
        let status = classify_status(current, self.cfg.failure_threshold, slope_per_day, rul_hours);
        let risk_level = classify_risk(rul_hours);
        let rul_ms = (rul_hours * MS_PER_HOUR) as i64;
        let lead_ms = (2.0 * self.cfg.avg_repair_lead_hours * MS_PER_HOUR) as i64;
        let recommended_maintenance_time = now_ms + (rul_ms - lead_ms).max(0);

        Ok(RulEstimate {
            device_id,
            ts: now_ms,
            model,
            rul_hours,
            confidence,
            status,
            risk_level,
            recommended_maintenance_time,
            factors: factors_out,
        })
    }
}

fn classify_status(current: f64, failure_threshold: f64, slope_per_day: f64, rul_hours: f64) -> RulStatus {
    if current >= failure_threshold * 2.0 {
        return RulStatus::Healthy;
    }
    if rul_hours < 24.0 {
        return RulStatus::NearFailure;
    }
    let nominal_rate = (100.0 - failure_threshold) / NOMINAL_LIFETIME_DAYS;
    if slope_per_day.abs() <= nominal_rate {
        RulStatus::NormalDegradation
    } else {
        RulStatus::Accelerated
    }
}

fn classify_risk(rul_hours: f64) -> RiskLevel {
    let rul_days = rul_hours / 24.0;
    if rul_days < 1.0 {
        RiskLevel::Critical
    } else if rul_days < 7.0 {
        RiskLevel::High
    } else if rul_days < 30.0 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// `H(t) = H0 + slope*t`. Returns `(days_from_now_to_threshold, r_squared,
/// slope_per_day)`, or `None` if the trend isn't moving toward the
/// threshold at all.
fn fit_linear(
    xs_days: &[f64],
    history: &[(i64, f64)],
    failure_threshold: f64,
    current: f64,
    now_day: f64,
) -> Option<(f64, f64, f64)> {
    let ys: Vec<f64> = history.iter().map(|(_, v)| *v).collect();
    let fit = linear_regression(xs_days, &ys)?;
    if fit.slope >= 0.0 {
        return None;
    }
    let days_to_threshold = (current - failure_threshold) / -fit.slope;
    let t_failure_day = *xs_days.last().unwrap() + days_to_threshold;
    Some((t_failure_day - now_day, fit.r_squared, fit.slope))
}

/// `H(t) = H0 * e^{-λt}`, fit by regressing `ln(H)` against `t`.
fn fit_exponential(
    xs_days: &[f64],
    history: &[(i64, f64)],
    failure_threshold: f64,
    current: f64,
    now_day: f64,
) -> Option<(f64, f64, f64)> {
    if current <= 0.0 || failure_threshold <= 0.0 {
        return None;
    }
    let ln_ys: Vec<f64> = history.iter().map(|(_, v)| v.max(1e-6).ln()).collect();
    let fit = linear_regression(xs_days, &ln_ys)?;
    if fit.slope >= 0.0 {
        return None;
    }
    let days_to_threshold = (failure_threshold / current).ln() / fit.slope;
    if days_to_threshold < 0.0 {
        return None;
    }
    let t_failure_day = *xs_days.last().unwrap() + days_to_threshold;
    // Approximate per-day health-unit slope at the current point for the
    // status classifier, which compares against a unit rate, not λ itself.
    let slope_per_day = fit.slope * current;
    Some((t_failure_day - now_day, fit.r_squared, slope_per_day))
}

/// Linearized two-parameter Weibull reliability fit:
/// `R(t) = exp(-(t/scale)^shape)`, regressed as
/// `ln(-ln(R)) = shape*ln(t+1) - shape*ln(scale)` against `R = H/100`.
fn fit_weibull(
    xs_days: &[f64],
    history: &[(i64, f64)],
    failure_threshold: f64,
    current: f64,
    now_day: f64,
) -> Option<(f64, f64, f64)> {
    let xs_ln: Vec<f64> = xs_days.iter().map(|d| (d + 1.0).ln()).collect();
    let ys_ln: Vec<f64> = history
        .iter()
        .map(|(_, v)| {
            let r = (v / 100.0).clamp(1e-6, 1.0 - 1e-6);
            (-r.ln()).ln()
        })
        .collect();
    let fit = linear_regression(&xs_ln, &ys_ln)?;
    if fit.slope <= 0.0 {
        return None;
    }
    let shape = fit.slope;
    let ln_scale = -fit.intercept / shape;

    let r_failure = (failure_threshold / 100.0).clamp(1e-6, 1.0 - 1e-6);
    let y_failure = (-r_failure.ln()).ln();
    let ln_t_failure = y_failure / shape + ln_scale;
    let t_failure_day = ln_t_failure.exp() - 1.0;
    if !t_failure_day.is_finite() {
        return None;
    }

    let slope_per_day = (current - failure_threshold) / (t_failure_day - now_day).max(1e-6) * -1.0;
    Some((t_failure_day - now_day, fit.r_squared, slope_per_day))
}

fn build_factors(factors: &[(u64, f64, f64)]) -> Vec<RulFactor> {
    let total_z: f64 = factors.iter().map(|(_, z, _)| z.abs()).sum();
    if total_z <= 0.0 {
        return Vec::new();
    }
    factors
        .iter()
        .map(|&(tag_id, z, delta_slope)| {
            let weight = z.abs() / total_z;
            RulFactor { tag_id, weight, contribution: delta_slope.signum() * weight }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(model: RulModelKind) -> RulPredictionConfig {
        RulPredictionConfig {
            failure_threshold: 30.0,
            model_type: model,
            history_window_days: 30,
            avg_repair_lead_hours: 48.0,
        }
    }

    #[test]
    fn linear_model_matches_worked_example() {
        // Health index drops 100, 98, ..., 82 over 10 days: slope -2/day.
        let history: Vec<(i64, f64)> = (0..10).map(|d| (d * 86_400_000, 100.0 - d as f64 * 2.0)).collect();
        let estimator = RulEstimator::new(cfg(RulModelKind::Linear));
        let now_ms = 9 * 86_400_000;
        let estimate = estimator.estimate(1, &history, &[], now_ms).unwrap();

        assert!((estimate.rul_hours / 24.0 - 26.0).abs() < 0.5);
        assert_eq!(estimate.risk_level, RiskLevel::Medium);
        assert!(estimate.confidence > 0.99);
    }

    #[test]
    fn improving_trend_is_healthy_with_long_horizon() {
        let history: Vec<(i64, f64)> = (0..10).map(|d| (d * 86_400_000, 50.0 + d as f64)).collect();
        let estimator = RulEstimator::new(cfg(RulModelKind::Linear));
        let estimate = estimator.estimate(1, &history, &[], 9 * 86_400_000).unwrap();
        assert_eq!(estimate.status, RulStatus::Healthy);
        assert_eq!(estimate.risk_level, RiskLevel::Low);
    }

    #[test]
    fn sparse_history_is_insufficient_data() {
        let history = vec![(0, 90.0), (86_400_000, 88.0)];
        let estimator = RulEstimator::new(cfg(RulModelKind::Linear));
        let estimate = estimator.estimate(1, &history, &[], 86_400_000).unwrap();
        assert_eq!(estimate.status, RulStatus::InsufficientData);
    }

    #[test]
    fn factors_are_normalized_and_signed() {
        let factors = [(1u64, 3.0, 1.0), (2u64, 1.0, -1.0)];
        let out = build_factors(&factors);
        assert_eq!(out.len(), 2);
        assert!((out[0].weight - 0.75).abs() < 1e-9);
        assert!(out[0].contribution > 0.0);
        assert!(out[1].contribution < 0.0);
    }
}
