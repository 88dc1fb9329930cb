//! Alarm rule evaluation and group aggregation (§4.4).
//!
//! Threshold rules fire once their predicate has held continuously for
//! `duration_ms`; ROC rules fire on rate of change over a rolling window;
//! offline rules fire when a tag hasn't updated within `threshold` seconds.
//! Firing inserts an `AlarmRecord` and attaches it to (or opens) the open
//! `AlarmGroup` for `(device_id, rule_id)`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use arc_swap::ArcSwap;
use tracing::{info, warn};

use crate::error::{retry_with_backoff, RetryPolicy};
use crate::store::TelemetryStore;
use crate::types::{AlarmGroup, AlarmRecord, AlarmRule, AlarmStatus, RocMode, RuleType, TelemetryPoint};

#[derive(Debug, Default)]
struct ThresholdState {
    first_true_ts: Option<i64>,
    /// Set once the sustained-duration predicate has fired, so a value that
    /// stays above threshold doesn't refire on every subsequent point; clears
    /// when the predicate goes false, re-arming for the next breach.
    fired: bool,
}

pub struct AlarmEvaluator {
    rules: ArcSwap<Vec<AlarmRule>>,
    threshold_state: Mutex<HashMap<u64, ThresholdState>>,
    roc_state: Mutex<HashMap<u64, VecDeque<(i64, f64)>>>,
    alarms: Mutex<HashMap<u64, AlarmRecord>>,
    groups: Mutex<HashMap<u64, AlarmGroup>>,
    /// `(device_id, rule_id) -> group_id` for groups still open (not Closed).
    open_group_index: Mutex<HashMap<(u64, u64), u64>>,
    next_alarm_id: AtomicU64,
    next_group_id: AtomicU64,
}

impl AlarmEvaluator {
    pub fn new() -> Self {
        Self {
            rules: ArcSwap::from_pointee(Vec::new()),
            threshold_state: Mutex::new(HashMap::new()),
            roc_state: Mutex::new(HashMap::new()),
            alarms: Mutex::new(HashMap::new()),
            groups: Mutex::new(HashMap::new()),
            open_group_index: Mutex::new(HashMap::new()),
            next_alarm_id: AtomicU64::new(1),
            next_group_id: AtomicU64::new(1),
        }
    }

    /// Swap in a freshly loaded rule set — called on the 30s cache refresh
    /// or on config-revision change (§4.4).
    pub fn set_rules(&self, rules: Vec<AlarmRule>) {
        self.rules.store(std::sync::Arc::new(rules));
    }

    pub fn alarm(&self, alarm_id: u64) -> Option<AlarmRecord> {
        self.alarms.lock().unwrap_or_else(|e| e.into_inner()).get(&alarm_id).cloned()
    }

    pub fn group(&self, group_id: u64) -> Option<AlarmGroup> {
        self.groups.lock().unwrap_or_else(|e| e.into_inner()).get(&group_id).cloned()
    }

    /// Alarms for `device_id` that are still open (not `Closed`) and either
    /// created or last updated at or after `since_ts`. Used by the health
    /// engine's alarm-score component to weigh recent alarm activity (§4.7).
    pub fn open_alarms_for_device_since(&self, device_id: u64, since_ts: i64) -> Vec<AlarmRecord> {
        self.alarms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|a| a.device_id == device_id && a.status != AlarmStatus::Closed && a.updated >= since_ts)
            .cloned()
            .collect()
    }

    /// Evaluate every enabled threshold/ROC rule matching this point's
    /// `(device_id, tag_id)`. Offline rules are handled separately by
    /// `check_offline`, since they fire on the *absence* of points.
    pub fn on_point(&self, point: &TelemetryPoint, now_ms: i64) -> Vec<AlarmRecord> {
        let Some(value) = point.value.as_f64() else {
            return Vec::new();
        };

        let rules = self.rules.load();
        let mut fired = Vec::new();
        for rule in rules.iter() {
            if !rule.enabled || rule.tag_id != point.tag_id {
                continue;
            }
            if let Some(device_id) = rule.device_id {
                if device_id != point.device_id {
                    continue;
                }
            }

            let record = match rule.rule_type {
                RuleType::Threshold => self.eval_threshold(rule, point.device_id, value, now_ms),
                RuleType::Roc => self.eval_roc(rule, point.device_id, value, now_ms),
                RuleType::Offline => None,
            };
            if let Some(record) = record {
                fired.push(record);
            }
        }
        fired
    }

    /// Check every enabled offline rule against the telemetry store's latest
    /// value for its tag. Intended to run on a fixed interval alongside the
    /// rule cache refresh, independent of point arrival.
    pub fn check_offline(&self, store: &TelemetryStore, now_ms: i64) -> Vec<AlarmRecord> {
        let rules = self.rules.load();
        let mut fired = Vec::new();
        for rule in rules.iter() {
            if !rule.enabled || rule.rule_type != RuleType::Offline {
                continue;
            }
            let Some(device_id) = rule.device_id else {
                continue;
            };
            let result = store.get_latest(device_id, Some(rule.tag_id));
            let last_ts = match result.value {
                Some(Some(point)) => point.ts,
                _ => continue,
            };
            let elapsed_secs = (now_ms - last_ts) as f64 / 1000.0;
            if elapsed_secs >= rule.threshold {
                let message = format_message(&rule.message_template, rule.tag_id, elapsed_secs, rule.threshold);
                fired.push(self.fire(rule, device_id, message, now_ms));
            }
        }
        fired
    }

    fn eval_threshold(&self, rule: &AlarmRule, device_id: u64, value: f64, now_ms: i64) -> Option<AlarmRecord> {
        let op = rule.condition?;
        let met = op.apply(value, rule.threshold);

        let mut states = self.threshold_state.lock().unwrap_or_else(|e| e.into_inner());
        let state = states.entry(rule.rule_id).or_default();

        if !met {
            state.first_true_ts = None;
            return None;
        }

        let first_true = *state.first_true_ts.get_or_insert(now_ms);
        if now_ms - first_true < rule.duration_ms as i64 {
            return None;
        }
        // Already fired for this continuous breach — suppress repeat firings
        // until the predicate clears and re-trips (re-arm semantics).
        state.first_true_ts = Some(i64::MIN);
        drop(states);

        let message = format_message(&rule.message_template, rule.tag_id, value, rule.threshold);
        Some(self.fire(rule, device_id, message, now_ms))
    }

    fn eval_roc(&self, rule: &AlarmRule, device_id: u64, value: f64, now_ms: i64) -> Option<AlarmRecord> {
        let mut rocs = self.roc_state.lock().unwrap_or_else(|e| e.into_inner());
        let ring = rocs.entry(rule.rule_id).or_default();
        ring.push_back((now_ms, value));
        while let Some(&(ts, _)) = ring.front() {
            if now_ms - ts > rule.roc_window_ms as i64 {
                ring.pop_front();
            } else {
                break;
            }
        }
        if ring.len() < 2 {
            return None;
        }
        let Some(&(_, first_v)) = ring.front() else {
            return None;
        };
        let Some(&(_, last_v)) = ring.back() else {
            return None;
        };

        let delta = last_v - first_v;
        let roc = match rule.roc_mode.unwrap_or(RocMode::Absolute) {
            RocMode::Absolute => delta,
            RocMode::Percent => {
                if first_v.abs() < f64::EPSILON {
                    return None;
                }
                delta / first_v * 100.0
            }
        };
        drop(rocs);

        if roc.abs() < rule.threshold.abs() {
            return None;
        }

        let message = format_message(&rule.message_template, rule.tag_id, roc, rule.threshold);
        Some(self.fire(rule, device_id, message, now_ms))
    }

    /// Insert a raw alarm record and attach it to (or open) the group for
    /// `(device_id, rule_id)`. Write retries with bounded backoff per §4.4;
    /// on persistent failure the alarm is logged and dropped.
    fn fire(&self, rule: &AlarmRule, device_id: u64, message: String, now_ms: i64) -> AlarmRecord {
        let alarm_id = self.next_alarm_id.fetch_add(1, Ordering::Relaxed);
        let record = AlarmRecord {
            alarm_id,
            device_id,
            tag_id: Some(rule.tag_id),
            ts: now_ms,
            severity: rule.severity,
            code: rule.rule_id,
            message,
            status: AlarmStatus::Open,
            created: now_ms,
            updated: now_ms,
            acked_by: None,
            acked_ts: None,
            ack_note: None,
        };

        self.alarms.lock().unwrap_or_else(|e| e.into_inner()).insert(alarm_id, record.clone());
        self.attach_to_group(device_id, rule.rule_id, &record);
        info!(alarm_id, rule_id = rule.rule_id, device_id, severity = rule.severity, "alarm fired");
        record
    }

    fn attach_to_group(&self, device_id: u64, rule_id: u64, record: &AlarmRecord) {
        let mut index = self.open_group_index.lock().unwrap_or_else(|e| e.into_inner());
        let mut groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        let key = (device_id, rule_id);
        if let Some(&group_id) = index.get(&key) {
            if let Some(group) = groups.get_mut(&group_id) {
                group.attach(record);
                return;
            }
        }
        let group_id = self.next_group_id.fetch_add(1, Ordering::Relaxed);
        let group = AlarmGroup::new(group_id, device_id, rule_id, record);
        groups.insert(group_id, group);
        index.insert(key, group_id);
    }

    /// Async wrapper demonstrating the bounded-retry write path for
    /// persistence-backed deployments; the in-memory fire path above is
    /// synchronous since it can't fail.
    pub async fn fire_with_retry(&self, rule: &AlarmRule, device_id: u64, message: String, now_ms: i64) -> AlarmRecord {
        match retry_with_backoff(RetryPolicy::alarm_write(), "alarm_write", || async {
            Ok::<_, std::convert::Infallible>(self.fire(rule, device_id, message.clone(), now_ms))
        })
        .await
        {
            Ok(record) => record,
            Err(never) => match never {},
        }
    }

    pub fn ack(&self, alarm_id: u64, user: &str, note: Option<String>, now_ms: i64) -> bool {
        let mut alarms = self.alarms.lock().unwrap_or_else(|e| e.into_inner());
        match alarms.get_mut(&alarm_id) {
            Some(alarm) => alarm.ack(now_ms, user, note),
            None => {
                warn!(alarm_id, "ack requested for unknown alarm");
                false
            }
        }
    }

    pub fn close(&self, alarm_id: u64, now_ms: i64) -> bool {
        let mut alarms = self.alarms.lock().unwrap_or_else(|e| e.into_inner());
        match alarms.get_mut(&alarm_id) {
            Some(alarm) => alarm.close(now_ms),
            None => false,
        }
    }

    /// Acknowledge the group and every non-Closed child alarm.
    pub fn ack_group(&self, group_id: u64, user: &str, note: Option<String>, now_ms: i64) -> bool {
        let mut groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        let Some(group) = groups.get_mut(&group_id) else {
            return false;
        };
        group.status = AlarmStatus::Acknowledged;
        let member_ids = group.member_alarm_ids.clone();
        drop(groups);

        let mut alarms = self.alarms.lock().unwrap_or_else(|e| e.into_inner());
        for id in member_ids {
            if let Some(alarm) = alarms.get_mut(&id) {
                alarm.ack(now_ms, user, note.clone());
            }
        }
        true
    }

    /// Close the group and every non-Closed child alarm, and drop it from
    /// the open-group index so a new firing opens a fresh group.
    pub fn close_group(&self, group_id: u64, now_ms: i64) -> bool {
        let mut groups = self.groups.lock().unwrap_or_else(|e| e.into_inner());
        let Some(group) = groups.get_mut(&group_id) else {
            return false;
        };
        group.status = AlarmStatus::Closed;
        let member_ids = group.member_alarm_ids.clone();
        let key = (group.device_id, group.rule_id);
        drop(groups);

        self.open_group_index.lock().unwrap_or_else(|e| e.into_inner()).remove(&key);

        let mut alarms = self.alarms.lock().unwrap_or_else(|e| e.into_inner());
        for id in member_ids {
            if let Some(alarm) = alarms.get_mut(&id) {
                alarm.close(now_ms);
            }
        }
        true
    }
}

impl Default for AlarmEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

fn format_message(template: &str, tag_id: u64, value: f64, threshold: f64) -> String {
    template
        .replace("{tag_id}", &tag_id.to_string())
        .replace("{value}", &format!("{value:.3}"))
        .replace("{threshold}", &format!("{threshold:.3}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CompareOp, Value};

    fn threshold_rule(rule_id: u64, duration_ms: u64) -> AlarmRule {
        AlarmRule {
            rule_id,
            tag_id: 1,
            device_id: Some(1),
            rule_type: RuleType::Threshold,
            condition: Some(CompareOp::Gt),
            threshold: 90.0,
            duration_ms,
            severity: 3,
            roc_window_ms: 0,
            roc_mode: None,
            message_template: "tag {tag_id} at {value} exceeds {threshold}".into(),
            enabled: true,
            updated_utc: 0,
        }
    }

    fn point(ts: i64, v: f64) -> TelemetryPoint {
        TelemetryPoint {
            device_id: 1,
            tag_id: 1,
            ts,
            seq: 0,
            value: Value::F64(v),
            quality: 192,
            protocol: "opcua".into(),
            source: "edge-1".into(),
        }
    }

    #[test]
    fn threshold_fires_after_sustained_duration() {
        let eval = AlarmEvaluator::new();
        eval.set_rules(vec![threshold_rule(1, 2000)]);

        assert!(eval.on_point(&point(0, 95.0), 0).is_empty());
        assert!(eval.on_point(&point(1000, 95.0), 1000).is_empty());
        let fired = eval.on_point(&point(2000, 95.0), 2000);
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn threshold_resets_when_predicate_clears() {
        let eval = AlarmEvaluator::new();
        eval.set_rules(vec![threshold_rule(1, 2000)]);
        eval.on_point(&point(0, 95.0), 0);
        eval.on_point(&point(1000, 50.0), 1000); // clears
        let fired = eval.on_point(&point(2000, 95.0), 2000);
        assert!(fired.is_empty()); // duration restarted at ts=2000
    }

    #[test]
    fn repeated_alarms_group_and_raise_severity() {
        let eval = AlarmEvaluator::new();
        eval.set_rules(vec![threshold_rule(1, 0)]);
        let a1 = eval.on_point(&point(0, 95.0), 0);
        assert_eq!(a1.len(), 1);

        // allow re-arm: value dips then re-trips
        eval.on_point(&point(100, 50.0), 100);
        let a2 = eval.on_point(&point(200, 95.0), 200);
        assert_eq!(a2.len(), 1);

        let group_id = *eval.open_group_index.lock().unwrap().get(&(1, 1)).unwrap();
        let group = eval.group(group_id).unwrap();
        assert_eq!(group.alarm_count, 2);
    }

    #[test]
    fn close_group_closes_children() {
        let eval = AlarmEvaluator::new();
        eval.set_rules(vec![threshold_rule(1, 0)]);
        eval.on_point(&point(0, 95.0), 0);
        let group_id = *eval.open_group_index.lock().unwrap().get(&(1, 1)).unwrap();
        assert!(eval.close_group(group_id, 500));
        let group = eval.group(group_id).unwrap();
        assert_eq!(group.status, AlarmStatus::Closed);
        let alarm = eval.alarm(1).unwrap();
        assert_eq!(alarm.status, AlarmStatus::Closed);
    }
}
