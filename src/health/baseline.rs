//! Per-`(device_id, tag_id)` running statistics backing the deviation and
//! stability scores (§4.7). Same shape as the motor baseline learner's
//! accumulator, keyed differently: here every monitored tag gets one running
//! Welford + reservoir rather than one per `(instance, mode, parameter)`.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use crate::stats::{Reservoir, Welford};
use crate::types::DeviceBaseline;

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub struct TagKey {
    pub device_id: u64,
    pub tag_id: u64,
}

struct Accumulator {
    welford: Welford,
    reservoir: Reservoir,
    first_sample_utc: i64,
    last_sample_utc: i64,
}

/// Learns and serves per-tag baselines for the health engine. Distinct from
/// `motor::baseline::BaselineLearner`: this one has no outlier rejection of
/// its own (the edge preprocessor already filtered gross outliers before
/// the point reached here) and tracks wall-clock learning duration for the
/// confidence computation in §4.7.
pub struct HealthBaselineStore {
    reservoir_size: usize,
    state: Mutex<HashMap<TagKey, Accumulator>>,
}

impl HealthBaselineStore {
    pub fn new(reservoir_size: usize) -> Self {
        Self { reservoir_size, state: Mutex::new(HashMap::new()) }
    }

    pub fn observe(&self, key: TagKey, value: f64) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Utc::now().timestamp();
        let acc = state.entry(key).or_insert_with(|| Accumulator {
            welford: Welford::new(),
            reservoir: Reservoir::new(self.reservoir_size),
            first_sample_utc: now,
            last_sample_utc: now,
        });
        acc.welford.update(value);
        acc.reservoir.push(value);
        acc.last_sample_utc = now;
    }

    pub fn z_score(&self, key: TagKey, value: f64) -> Option<f64> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.get(&key)?.welford.z_score(value)
    }

    pub fn sample_count(&self, key: TagKey) -> u64 {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.get(&key).map(|a| a.welford.count()).unwrap_or(0)
    }

    pub fn snapshot(&self, key: TagKey) -> Option<DeviceBaseline> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let acc = state.get(&key)?;
        if acc.welford.count() == 0 {
            return None;
        }
        let learning_hours = (acc.last_sample_utc - acc.first_sample_utc) as f64 / 3600.0;
        Some(DeviceBaseline {
            tag_id: key.tag_id,
            mean: acc.welford.mean(),
            std: acc.welford.std_dev(),
            min: acc.reservoir.min(),
            max: acc.reservoir.max(),
            p05: acc.reservoir.percentile(0.05),
            p95: acc.reservoir.percentile(0.95),
            sample_count: acc.welford.count(),
            learning_hours,
        })
    }

    /// Coefficient of variation (`std / |mean|`), the input to the
    /// stability score. `None` without a baseline or with a mean too close
    /// to zero to make the ratio meaningful.
    pub fn coefficient_of_variation(&self, key: TagKey) -> Option<f64> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let acc = state.get(&key)?;
        if acc.welford.count() < 2 || acc.welford.mean().abs() < 1e-9 {
            return None;
        }
        Some(acc.welford.std_dev() / acc.welford.mean().abs())
    }

    /// `max - min` over the reservoir, the normalizer the trend score (§4.7)
    /// divides a tag's slope by before applying the slope-to-penalty gain.
    /// `None` without a baseline or with a degenerate (zero-width) range.
    pub fn baseline_range(&self, key: TagKey) -> Option<f64> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let acc = state.get(&key)?;
        if acc.welford.count() < 2 {
            return None;
        }
        let range = acc.reservoir.max() - acc.reservoir.min();
        if range.abs() < 1e-9 {
            None
        } else {
            Some(range)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> TagKey {
        TagKey { device_id: 1, tag_id: 1 }
    }

    #[test]
    fn no_snapshot_before_any_sample() {
        let store = HealthBaselineStore::new(100);
        assert!(store.snapshot(key()).is_none());
    }

    #[test]
    fn snapshot_reflects_observed_values() {
        let store = HealthBaselineStore::new(100);
        for v in [8.0, 9.0, 10.0, 11.0, 12.0] {
            store.observe(key(), v);
        }
        let snap = store.snapshot(key()).unwrap();
        assert_eq!(snap.sample_count, 5);
        assert!((snap.mean - 10.0).abs() < 1e-9);
    }

    #[test]
    fn z_score_requires_two_samples() {
        let store = HealthBaselineStore::new(100);
        store.observe(key(), 10.0);
        assert!(store.z_score(key(), 15.0).is_none());
        store.observe(key(), 12.0);
        assert!(store.z_score(key(), 15.0).is_some());
    }

    #[test]
    fn coefficient_of_variation_is_none_near_zero_mean() {
        let store = HealthBaselineStore::new(100);
        store.observe(key(), 0.0);
        store.observe(key(), 0.0001);
        assert!(store.coefficient_of_variation(key()).is_none());
    }
}
