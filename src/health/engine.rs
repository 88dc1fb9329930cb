//! Composite health scoring (§4.7). Ground: the weighted-subscore shape of
//! the motor baseline learner's EWMA update combined with the collection
//! engine's `ArcSwap`-backed rule set, generalized here to a rule set of
//! `TagImportanceRule`/`TagCorrelationRule` refreshed independently of the
//! per-device scoring calls.

use std::collections::HashMap;
use std::sync::Mutex;

use arc_swap::ArcSwap;
use regex::Regex;

use crate::alarms::AlarmEvaluator;
use crate::config::{HealthAssessmentConfig, MultiScaleConfig};
use crate::error::HealthError;
use crate::stats::linear_regression;
use crate::store::TelemetryStore;
use crate::types::{
    CorrelationMode, DeviceHealthSnapshot, HealthAssessment, HealthLevel, ProblemTag, Tag, TagCorrelationRule,
    TagImportanceRule, TrendDirection,
};

use super::baseline::{HealthBaselineStore, TagKey};
use super::importance::ImportanceResolver;

/// One tag's reading, supplied by the caller for a single assessment pass.
pub struct TagReading<'a> {
    pub tag: &'a Tag,
    pub value: f64,
}

fn glob_match(pattern: &str, text: &str) -> bool {
    let mut anchored = String::with_capacity(pattern.len() + 2);
    anchored.push('^');
    for (i, part) in pattern.split('*').enumerate() {
        if i > 0 {
            anchored.push_str(".*");
        }
        anchored.push_str(&regex::escape(part));
    }
    anchored.push('$');
    Regex::new(&anchored).map(|r| r.is_match(text)).unwrap_or(false)
}

/// Maps a raw alarm severity (1-5, §3) onto the four named buckets the
/// configured `AlarmScorePenalties` are keyed by. No named severity enum
/// exists at the alarm layer (severity there is a free-form operator scale),
/// so this mapping is the health engine's own interpretation: 4-5 Critical,
/// 3 Error, 2 Warning, 0-1 Info.
fn severity_penalty(severity: u8, penalties: &crate::config::AlarmScorePenalties) -> f64 {
    match severity {
        4..=u8::MAX => penalties.critical,
        3 => penalties.error,
        2 => penalties.warning,
        _ => penalties.info,
    }
}

pub struct HealthEngine {
    cfg: HealthAssessmentConfig,
    multiscale: MultiScaleConfig,
    baselines: HealthBaselineStore,
    importance_rules: ArcSwap<Vec<TagImportanceRule>>,
    correlation_rules: ArcSwap<Vec<TagCorrelationRule>>,
    /// Last composite index per device, to derive `trend_direction` between
    /// consecutive assessment calls.
    last_index: Mutex<HashMap<u64, f64>>,
}

impl HealthEngine {
    pub fn new(cfg: HealthAssessmentConfig, multiscale: MultiScaleConfig, reservoir_size: usize) -> Self {
        Self {
            cfg,
            multiscale,
            baselines: HealthBaselineStore::new(reservoir_size),
            importance_rules: ArcSwap::from_pointee(Vec::new()),
            correlation_rules: ArcSwap::from_pointee(Vec::new()),
            last_index: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_importance_rules(&self, rules: Vec<TagImportanceRule>) {
        self.importance_rules.store(std::sync::Arc::new(rules));
    }

    pub fn set_correlation_rules(&self, rules: Vec<TagCorrelationRule>) {
        self.correlation_rules.store(std::sync::Arc::new(rules));
    }

    /// Feed one observed value into the per-tag baseline. Called from the
    /// ingest path for every accepted telemetry point, independent of when
    /// `assess` is next called.
    pub fn observe(&self, device_id: u64, tag_id: u64, value: f64) {
        self.baselines.observe(TagKey { device_id, tag_id }, value);
    }

    fn importance_resolver(&self) -> Result<ImportanceResolver, HealthError> {
        ImportanceResolver::compile(&self.importance_rules.load(), &self.cfg)
    }

    /// Weighted multi-scale trend slope for one tag, in units-per-minute,
    /// combining the short/medium/long regression windows per
    /// `MultiScaleConfig`'s weights. `None` if every window has fewer than
    /// two samples.
    fn multiscale_slope(&self, store: &TelemetryStore, device_id: u64, tag_id: u64, now_ms: i64) -> Option<f64> {
        let windows = [
            (self.multiscale.short_term_minutes, self.multiscale.short_weight),
            (self.multiscale.medium_term_minutes, self.multiscale.medium_weight),
            (self.multiscale.long_term_minutes, self.multiscale.long_weight),
        ];
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for (minutes, weight) in windows {
            let start_ts = now_ms - (minutes as i64) * 60_000;
            let samples = store.history_values(device_id, tag_id, start_ts, now_ms);
            let Some(samples) = samples.value else { continue };
            if samples.len() < 2 {
                continue;
            }
            let xs: Vec<f64> = samples.iter().map(|(ts, _)| (ts - start_ts) as f64 / 60_000.0).collect();
            let ys: Vec<f64> = samples.iter().map(|(_, v)| *v).collect();
            if let Some(fit) = linear_regression(&xs, &ys) {
                weighted_sum += fit.slope * weight;
                weight_total += weight;
            }
        }
        if weight_total <= 0.0 {
            None
        } else {
            Some(weighted_sum / weight_total)
        }
    }

    fn correlation_triggers(&self, device_name: &str, readings: &[TagReading<'_>]) -> Vec<u64> {
        let rules = self.correlation_rules.load();
        let mut triggered = Vec::new();
        for rule in rules.iter() {
            if !rule.enabled || !glob_match(&rule.device_pattern, device_name) {
                continue;
            }
            let tag1 = readings.iter().find(|r| glob_match(&rule.tag1_pattern, &r.tag.name));
            let tag2 = readings.iter().find(|r| glob_match(&rule.tag2_pattern, &r.tag.name));
            let (Some(a), Some(b)) = (tag1, tag2) else { continue };

            let hit = match rule.mode {
                CorrelationMode::SameDirection => (a.value >= 0.0) == (b.value >= 0.0) && a.value.abs() > rule.threshold,
                CorrelationMode::OppositeDirection => {
                    (a.value >= 0.0) != (b.value >= 0.0) && a.value.abs() > rule.threshold
                }
                CorrelationMode::ThresholdCombination => a.value.abs() > rule.threshold && b.value.abs() > rule.threshold,
            };
            if hit {
                triggered.push(rule.rule_id);
            }
        }
        triggered
    }

    /// Run one assessment pass for `device_id` given its current tag
    /// readings. `store` supplies trend history; `alarms` supplies recent
    /// alarm activity for the alarm sub-score.
    pub fn assess(
        &self,
        device_id: u64,
        device_name: &str,
        readings: &[TagReading<'_>],
        store: &TelemetryStore,
        alarms: &AlarmEvaluator,
        now_ms: i64,
    ) -> Result<HealthAssessment, HealthError> {
        if readings.is_empty() {
            return Err(HealthError::InsufficientData);
        }
        let resolver = self.importance_resolver()?;

        let mut deviation_weighted_penalty = 0.0;
        let mut deviation_weight_total = 0.0;
        let mut trend_score_sum = 0.0;
        let mut trend_count = 0u32;
        let mut stability_score_sum = 0.0;
        let mut stability_count = 0u32;
        let mut confidence_ratios = Vec::with_capacity(readings.len());
        let mut problem_candidates: Vec<ProblemTag> = Vec::new();

        for reading in readings {
            let key = TagKey { device_id, tag_id: reading.tag.tag_id };
            let importance = resolver.resolve(&reading.tag.name);

            if let Some(z) = self.baselines.z_score(key, reading.value) {
                let penalty = (z.abs() * 20.0).min(100.0);
                deviation_weighted_penalty += penalty * importance.weight();
                deviation_weight_total += importance.weight();
                problem_candidates.push(ProblemTag {
                    tag_id: reading.tag.tag_id,
                    z_score: z,
                    importance,
                    description: format!("{} std devs from baseline", format_z(z)),
                });
            }

            if let Some(cv) = self.baselines.coefficient_of_variation(key) {
                stability_score_sum += (100.0 * (-cv * self.cfg.stability_k).exp()).clamp(0.0, 100.0);
                stability_count += 1;
            }

            if let Some(slope) = self.multiscale_slope(store, device_id, reading.tag.tag_id, now_ms) {
                let range = self.baselines.baseline_range(key);
                if let Some(range) = range {
                    let slope_norm = slope / range;
                    let penalty = (slope_norm.abs() * self.cfg.trend_k).min(100.0);
                    trend_score_sum += 100.0 - penalty;
                    trend_count += 1;
                }
            }

            let sample_count = self.baselines.sample_count(key);
            confidence_ratios.push((sample_count as f64 / self.cfg.min_sample_count.max(1) as f64).min(1.0));
        }

        let deviation_penalty = if deviation_weight_total > 0.0 {
            deviation_weighted_penalty / deviation_weight_total
        } else {
            0.0
        };
        let deviation_score = (100.0 - deviation_penalty).clamp(0.0, 100.0);
        let trend_score = if trend_count > 0 {
            (trend_score_sum / trend_count as f64).clamp(0.0, 100.0)
        } else {
            100.0
        };
        let stability_score = if stability_count > 0 {
            (stability_score_sum / stability_count as f64).clamp(0.0, 100.0)
        } else {
            100.0
        };

        let window_ms = (self.cfg.default_window_minutes as i64) * 60_000;
        let open_alarms = alarms.open_alarms_for_device_since(device_id, now_ms - window_ms);
        let mut alarm_score = 100.0;
        for alarm in &open_alarms {
            let mut penalty = severity_penalty(alarm.severity, &self.cfg.alarm_penalties);
            if self.cfg.alarm_consider_duration {
                let duration_hours = (now_ms - alarm.created) as f64 / 3_600_000.0;
                let multiplier = (1.0 + duration_hours * self.cfg.alarm_duration_factor_per_hour)
                    .min(self.cfg.alarm_duration_max_multiplier);
                penalty *= multiplier;
            }
            alarm_score -= penalty;
        }
        alarm_score = alarm_score.max(self.cfg.alarm_score_min);

        let weights = &self.cfg.weights;
        let index = (weights.deviation * deviation_score
            + weights.trend * trend_score
            + weights.stability * stability_score
            + weights.alarm * alarm_score)
            .clamp(0.0, 100.0)
            .round();

        let level = if index >= self.cfg.level_thresholds.healthy_min {
            HealthLevel::Healthy
        } else if index >= self.cfg.level_thresholds.attention_min {
            HealthLevel::Attention
        } else if index >= self.cfg.level_thresholds.warning_min {
            HealthLevel::Warning
        } else {
            HealthLevel::Critical
        };

        let confidence = if confidence_ratios.is_empty() {
            0.0
        } else {
            confidence_ratios.iter().sum::<f64>() / confidence_ratios.len() as f64
        };
        let confidence_note = if confidence < 1.0 {
            Some(format!(
                "average {:.0}% of required samples collected across {} tags",
                confidence * 100.0,
                readings.len()
            ))
        } else {
            None
        };

        problem_candidates.sort_by(|a, b| {
            let sa = a.z_score.abs() * a.importance.weight();
            let sb = b.z_score.abs() * b.importance.weight();
            sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
        });
        problem_candidates.truncate(self.cfg.problem_tags_top_n);

        let trend_direction = {
            let mut last = self.last_index.lock().unwrap_or_else(|e| e.into_inner());
            let direction = match last.get(&device_id) {
                Some(&prev) if index > prev + 0.5 => Some(TrendDirection::Improving),
                Some(&prev) if index < prev - 0.5 => Some(TrendDirection::Degrading),
                Some(_) => Some(TrendDirection::Stable),
                None => None,
            };
            last.insert(device_id, index);
            direction
        };

        let triggered_correlations = self.correlation_triggers(device_name, readings);

        Ok(HealthAssessment {
            snapshot: DeviceHealthSnapshot {
                device_id,
                ts: now_ms,
                index,
                level,
                deviation_score,
                trend_score,
                stability_score,
                alarm_score,
                confidence,
            },
            problem_tags: problem_candidates,
            trend_direction,
            confidence_note,
            triggered_correlations,
        })
    }
}

fn format_z(z: f64) -> String {
    format!("{z:.1}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    fn tag(tag_id: u64, name: &str) -> Tag {
        Tag { tag_id, device_id: 1, name: name.to_string(), data_type: DataType::Float, enabled: true, updated_utc: 0 }
    }

    fn engine() -> HealthEngine {
        HealthEngine::new(HealthAssessmentConfig::default(), MultiScaleConfig::default(), 200)
    }

    fn store() -> TelemetryStore {
        let dir = tempfile::tempdir().unwrap();
        TelemetryStore::open(dir.path()).unwrap()
    }

    #[test]
    fn stable_tag_near_baseline_yields_high_index() {
        let engine = engine();
        for i in 0..50 {
            // Alternate +-0.2 around 100.0 so the baseline has a realistic
            // (nonzero) spread rather than a degenerate zero-variance one.
            engine.observe(1, 10, if i % 2 == 0 { 100.2 } else { 99.8 });
        }
        let t = tag(10, "motor_current");
        let readings = vec![TagReading { tag: &t, value: 100.2 }];
        let assessment = engine.assess(1, "device-1", &readings, &store(), &AlarmEvaluator::new(), 1_000_000).unwrap();
        assert_eq!(assessment.snapshot.level, HealthLevel::Healthy);
        assert!(assessment.snapshot.index > 90.0);
    }

    #[test]
    fn scenario_5_composite_matches_spec_worked_example() {
        // Section 8 scenario 5: critical-importance tag, baseline mean=50
        // std=2, window value constant 56 -> z=3 -> deviation_score=40;
        // no trend/stability/alarm penalty -> composite 79, Attention.
        let engine = engine();
        for i in 0..50 {
            engine.observe(1, 10, if i % 2 == 0 { 52.0 } else { 48.0 });
        }
        let t = tag(10, "temp");
        let readings = vec![TagReading { tag: &t, value: 56.0 }];
        let assessment = engine.assess(1, "device-1", &readings, &store(), &AlarmEvaluator::new(), 1_000_000).unwrap();
        assert!((assessment.snapshot.deviation_score - 40.0).abs() < 5.0);
        assert_eq!(assessment.snapshot.trend_score, 100.0);
        assert_eq!(assessment.snapshot.alarm_score, 100.0);
        assert_eq!(assessment.snapshot.level, HealthLevel::Attention);
    }

    #[test]
    fn gross_deviation_lowers_index_and_surfaces_problem_tag() {
        let engine = engine();
        for _ in 0..50 {
            engine.observe(1, 10, 100.0);
        }
        let t = tag(10, "motor_current");
        let readings = vec![TagReading { tag: &t, value: 500.0 }];
        let assessment = engine.assess(1, "device-1", &readings, &store(), &AlarmEvaluator::new(), 1_000_000).unwrap();
        assert!(assessment.snapshot.index < 90.0);
        assert_eq!(assessment.problem_tags.len(), 1);
        assert_eq!(assessment.problem_tags[0].tag_id, 10);
    }

    #[test]
    fn empty_readings_is_an_error() {
        let engine = engine();
        let result = engine.assess(1, "device-1", &[], &store(), &AlarmEvaluator::new(), 0);
        assert!(result.is_err());
    }

    #[test]
    fn glob_match_handles_wildcard_both_ends() {
        assert!(glob_match("pump_*_pressure", "pump_01_pressure"));
        assert!(!glob_match("pump_*_pressure", "pump_pressure_sensor"));
    }
}
