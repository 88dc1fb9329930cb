//! Incremental motor baseline learning (§4.6): a `(instance, mode, parameter)`
//! keyed set of Welford accumulators plus reservoirs for percentile estimate,
//! updated sample-by-sample with outlier rejection and confidence aging.
//! Ground: the teacher's `cfc/normalizer.rs` `OnlineNormalizer`, generalized
//! from a single running stat to the full weighted-update formula this
//! subsystem needs.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use crate::config::DynamicBaselineConfig;
use crate::stats::Welford;
use crate::stats::Reservoir;
use crate::types::{BaselineProfile, FrequencyProfile, MotorParameter, TagStats};

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct BaselineKey {
    pub instance_id: u64,
    pub mode_id: u64,
    pub parameter: MotorParameter,
}

struct Accumulator {
    welford: Welford,
    reservoir: Reservoir,
    version: u64,
    last_updated_utc: i64,
}

/// Learns and serves per-`(instance, mode, parameter)` baselines. Safe for
/// concurrent update from multiple edge-link workers; each key's state is
/// independent so contention is limited to the key's own slot.
pub struct BaselineLearner {
    cfg: DynamicBaselineConfig,
    state: Mutex<HashMap<BaselineKey, Accumulator>>,
}

impl BaselineLearner {
    pub fn new(cfg: DynamicBaselineConfig) -> Self {
        Self { cfg, state: Mutex::new(HashMap::new()) }
    }

    /// Incorporate one `value` observed at the given key. Samples more than
    /// `anomaly_filter_threshold` standard deviations from the current mean
    /// are rejected (not folded into the running statistics) once the
    /// accumulator has enough history to judge that (`min_sample_count`).
    /// Returns `true` if the sample was accepted.
    pub fn observe(&self, key: BaselineKey, value: f64) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let acc = state.entry(key).or_insert_with(|| Accumulator {
            welford: Welford::new(),
            reservoir: Reservoir::new(self.cfg.reservoir_size),
            version: 0,
            last_updated_utc: Utc::now().timestamp(),
        });

        if acc.welford.count() >= self.cfg.min_sample_count {
            if let Some(z) = acc.welford.z_score(value) {
                if z.abs() > self.cfg.anomaly_filter_threshold {
                    return false;
                }
            }
        }

        weighted_update(&mut acc.welford, value, self.cfg.incremental_weight);
        acc.reservoir.push(value);
        acc.version += 1;
        acc.last_updated_utc = Utc::now().timestamp();
        true
    }

    /// Apply confidence aging to every accumulator older than `min_age_days`,
    /// decaying accumulated variance toward zero confidence per elapsed day
    /// without resetting the mean.
    pub fn age_all(&self, now_utc: i64) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for acc in state.values_mut() {
            let days = ((now_utc - acc.last_updated_utc) as f64 / 86_400.0).max(0.0);
            if days > 0.0 {
                acc.welford.age(self.cfg.aging_factor, days);
            }
        }
    }

    /// Snapshot the current baseline for `key`, with an optional frequency
    /// profile attached by the caller (the learner itself has no access to
    /// raw sample windows, only the running statistics).
    pub fn snapshot(&self, key: BaselineKey, frequency: Option<FrequencyProfile>) -> Option<BaselineProfile> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let acc = state.get(&key)?;
        if acc.welford.count() == 0 {
            return None;
        }
        Some(BaselineProfile {
            instance_id: key.instance_id,
            mode_id: key.mode_id,
            parameter: key.parameter,
            stats: TagStats {
                mean: acc.welford.mean(),
                std: acc.welford.std_dev(),
                min: acc.reservoir.min(),
                max: acc.reservoir.max(),
                median: acc.reservoir.percentile(0.5),
                p05: acc.reservoir.percentile(0.05),
                p95: acc.reservoir.percentile(0.95),
                sample_count: acc.welford.count(),
            },
            frequency,
            version: acc.version,
            learned_to_utc: acc.last_updated_utc,
        })
    }

    /// z-score of `value` against the current baseline at `key`, `None` if
    /// no baseline exists yet.
    pub fn z_score(&self, key: BaselineKey, value: f64) -> Option<f64> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.get(&key)?.welford.z_score(value)
    }
}

/// `μ' = μ + w·(x − μ)`, `σ²' = (1−w)·σ² + w·(x−μ)·(x−μ')` — the single-
/// sample form of the exponentially-weighted update (§4.6), applied on top
/// of a Welford accumulator so early samples (count < 1/w) still converge
/// at the unweighted rate before the exponential weighting takes over.
fn weighted_update(w: &mut Welford, x: f64, weight: f64) {
    if w.count() == 0 {
        w.update(x);
        return;
    }
    let old_mean = w.mean();
    let old_var = w.variance();
    let new_mean = old_mean + weight * (x - old_mean);
    let new_var = (1.0 - weight) * old_var + weight * (x - old_mean) * (x - new_mean);
    w.update(x);
    w.set_mean_variance(new_mean, new_var);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> DynamicBaselineConfig {
        DynamicBaselineConfig {
            incremental_weight: 0.1,
            anomaly_filter_threshold: 4.0,
            min_sample_count: 5,
            aging_factor: 0.05,
            reservoir_size: 100,
            fft_window_samples: 2048,
            fundamental_freq_min_hz: 45.0,
            fundamental_freq_max_hz: 65.0,
            frequency_harmonics: 10,
        }
    }

    fn key() -> BaselineKey {
        BaselineKey { instance_id: 1, mode_id: 1, parameter: MotorParameter::Current }
    }

    #[test]
    fn baseline_converges_around_stable_mean() {
        let learner = BaselineLearner::new(cfg());
        for _ in 0..200 {
            learner.observe(key(), 10.0);
        }
        let snap = learner.snapshot(key(), None).unwrap();
        assert!((snap.stats.mean - 10.0).abs() < 0.5);
    }

    #[test]
    fn gross_outlier_is_rejected_once_history_exists() {
        let learner = BaselineLearner::new(cfg());
        for _ in 0..20 {
            learner.observe(key(), 10.0);
        }
        let accepted = learner.observe(key(), 10_000.0);
        assert!(!accepted);
    }

    #[test]
    fn no_baseline_before_any_sample() {
        let learner = BaselineLearner::new(cfg());
        assert!(learner.snapshot(key(), None).is_none());
    }
}
