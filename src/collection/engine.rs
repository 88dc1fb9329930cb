//! Condition-driven collection rule engine (§4.3): a 500ms tick loop drives
//! each enabled rule's `Idle → Collecting → PostBuffer → Idle` state
//! machine against a per-tick snapshot of latest tag values.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use arc_swap::ArcSwap;
use tracing::{info, warn};

use crate::store::TelemetryStore;
use crate::types::{
    CollectionRule, CollectionSegment, Condition, SegmentStatus, TagSnapshot,
};

/// Per-device `(tag_id) -> (value, ts)` snapshot refreshed once per tick,
/// built only from the tags rules actually reference so the engine doesn't
/// pull the whole telemetry store on every pass.
#[derive(Debug, Default)]
struct LatestSnapshot {
    values: HashMap<u64, (f64, i64)>,
}

impl TagSnapshot for LatestSnapshot {
    fn latest(&self, tag_id: u64) -> Option<(f64, i64)> {
        self.values.get(&tag_id).copied()
    }
}

#[derive(Debug, Clone)]
enum Phase {
    Idle,
    Collecting {
        segment_id: u64,
        stop_condition_start: Option<i64>,
    },
    PostBuffer {
        segment_id: u64,
        deadline_ts: i64,
    },
}

struct RuleState {
    phase: Phase,
}

/// An observable transition the engine made this tick, for logging or
/// downstream persistence — the engine itself keeps segments in memory
/// (queryable via `segment` / `open_segments`) rather than assuming a
/// specific store shape for them.
#[derive(Debug, Clone)]
pub enum CollectionEvent {
    SegmentOpened(CollectionSegment),
    SegmentClosed(CollectionSegment),
}

pub struct CollectionEngine {
    rules: ArcSwap<Vec<CollectionRule>>,
    states: Mutex<HashMap<u64, RuleState>>,
    segments: Mutex<HashMap<u64, CollectionSegment>>,
    next_segment_id: AtomicU64,
}

impl CollectionEngine {
    pub fn new() -> Self {
        Self {
            rules: ArcSwap::from_pointee(Vec::new()),
            states: Mutex::new(HashMap::new()),
            segments: Mutex::new(HashMap::new()),
            next_segment_id: AtomicU64::new(1),
        }
    }

    /// Swap in a freshly loaded rule set. Called by the config hot-reload
    /// path when the collection-rule revision changes.
    pub fn set_rules(&self, rules: Vec<CollectionRule>) {
        self.rules.store(std::sync::Arc::new(rules));
    }

    pub fn segment(&self, segment_id: u64) -> Option<CollectionSegment> {
        self.segments.lock().unwrap_or_else(|e| e.into_inner()).get(&segment_id).cloned()
    }

    pub fn open_segments(&self) -> Vec<CollectionSegment> {
        self.segments
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|s| s.status == SegmentStatus::Collecting)
            .cloned()
            .collect()
    }

    /// Run one tick: refresh the latest-value snapshot for every device with
    /// an enabled rule, then evaluate each rule's state machine.
    pub fn tick(&self, store: &TelemetryStore, now_ms: i64) -> Vec<CollectionEvent> {
        let rules = self.rules.load();
        let enabled: Vec<&CollectionRule> = rules.iter().filter(|r| r.enabled).collect();

        let mut snapshots: HashMap<u64, LatestSnapshot> = HashMap::new();
        for rule in &enabled {
            let snapshot = snapshots.entry(rule.device_id).or_default();
            let mut tags = HashSet::new();
            collect_tags(&rule.start_condition, &mut tags);
            collect_tags(&rule.stop_condition, &mut tags);
            for tag_id in tags {
                if snapshot.values.contains_key(&tag_id) {
                    continue;
                }
                let result = store.get_latest(rule.device_id, Some(tag_id));
                if let Some(Some(point)) = result.value {
                    if let Some(v) = point.value.as_f64() {
                        snapshot.values.insert(tag_id, (v, point.ts));
                    }
                } else if !result.is_ok() {
                    warn!(device_id = rule.device_id, tag_id, "failed to refresh collection snapshot tag");
                }
            }
        }

        let mut events = Vec::new();
        let empty_snapshot = LatestSnapshot::default();
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        for rule in enabled {
            let snapshot = snapshots.get(&rule.device_id).unwrap_or(&empty_snapshot);
            let state = states.entry(rule.rule_id).or_insert_with(|| RuleState { phase: Phase::Idle });
            if let Some(event) = self.step(rule, state, snapshot, now_ms) {
                events.push(event);
            }
        }
        events
    }

    fn step(
        &self,
        rule: &CollectionRule,
        state: &mut RuleState,
        snapshot: &LatestSnapshot,
        now_ms: i64,
    ) -> Option<CollectionEvent> {
        match state.phase {
            Phase::Idle => {
                if rule.start_condition.eval(snapshot) {
                    let segment_id = self.next_segment_id.fetch_add(1, Ordering::Relaxed);
                    let start_ts = now_ms - rule.collection_config.pre_buffer_seconds as i64 * 1000;
                    let segment = CollectionSegment {
                        id: segment_id,
                        rule_id: rule.rule_id,
                        device_id: rule.device_id,
                        start_ts,
                        end_ts: None,
                        status: SegmentStatus::Collecting,
                        data_point_count: 0,
                        metadata: String::new(),
                    };
                    info!(rule_id = rule.rule_id, segment_id, "collection segment opened");
                    self.segments.lock().unwrap_or_else(|e| e.into_inner()).insert(segment_id, segment.clone());
                    state.phase = Phase::Collecting {
                        segment_id,
                        stop_condition_start: None,
                    };
                    Some(CollectionEvent::SegmentOpened(segment))
                } else {
                    None
                }
            }
            Phase::Collecting {
                segment_id,
                stop_condition_start,
            } => {
                let stop_met = rule.stop_condition.eval(snapshot);
                if stop_met {
                    let started_at = stop_condition_start.unwrap_or(now_ms);
                    if stop_condition_start.is_none() {
                        state.phase = Phase::Collecting {
                            segment_id,
                            stop_condition_start: Some(now_ms),
                        };
                    }
                    if now_ms - started_at >= rule.stop_duration_ms as i64 {
                        state.phase = Phase::PostBuffer {
                            segment_id,
                            deadline_ts: now_ms + rule.collection_config.post_buffer_seconds as i64 * 1000,
                        };
                    }
                } else if stop_condition_start.is_some() {
                    state.phase = Phase::Collecting {
                        segment_id,
                        stop_condition_start: None,
                    };
                }
                None
            }
            Phase::PostBuffer { segment_id, deadline_ts } => {
                if now_ms >= deadline_ts {
                    let segment = self.finalize_segment(segment_id, now_ms);
                    state.phase = Phase::Idle;
                    segment.map(CollectionEvent::SegmentClosed)
                } else {
                    None
                }
            }
        }
    }

    fn finalize_segment(&self, segment_id: u64, now_ms: i64) -> Option<CollectionSegment> {
        let mut segments = self.segments.lock().unwrap_or_else(|e| e.into_inner());
        let segment = segments.get_mut(&segment_id)?;
        segment.end_ts = Some(now_ms);
        segment.status = SegmentStatus::Completed;
        let finished = segment.clone();
        info!(segment_id, "collection segment closed");
        Some(finished)
    }

    /// Best-effort shutdown: finalize any segment still `Collecting` or in
    /// `PostBuffer` so nothing is left open across a restart.
    pub fn shutdown(&self, now_ms: i64) -> Vec<CollectionEvent> {
        let mut events = Vec::new();
        let mut states = self.states.lock().unwrap_or_else(|e| e.into_inner());
        let segment_ids: Vec<u64> = states
            .values()
            .filter_map(|s| match s.phase {
                Phase::Collecting { segment_id, .. } | Phase::PostBuffer { segment_id, .. } => Some(segment_id),
                Phase::Idle => None,
            })
            .collect();
        for segment_id in segment_ids {
            if let Some(segment) = self.finalize_segment(segment_id, now_ms) {
                events.push(CollectionEvent::SegmentClosed(segment));
            }
        }
        for state in states.values_mut() {
            state.phase = Phase::Idle;
        }
        events
    }
}

impl Default for CollectionEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_tags(condition: &Condition, out: &mut HashSet<u64>) {
    match condition {
        Condition::And { items } | Condition::Or { items } => {
            for item in items {
                collect_tags(item, out);
            }
        }
        Condition::TagPred { tag_id, .. } => {
            out.insert(*tag_id);
        }
        Condition::Duration { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CollectionConfig, CompareOp};

    fn rule(rule_id: u64, stop_duration_ms: u64) -> CollectionRule {
        CollectionRule {
            rule_id,
            device_id: 1,
            start_condition: Condition::TagPred {
                tag_id: 1,
                op: CompareOp::Gt,
                value: 50.0,
            },
            stop_condition: Condition::TagPred {
                tag_id: 1,
                op: CompareOp::Lte,
                value: 50.0,
            },
            stop_duration_ms,
            collection_config: CollectionConfig {
                tags: vec![1],
                pre_buffer_seconds: 0,
                post_buffer_seconds: 0,
            },
            enabled: true,
            updated_utc: 0,
            trigger_count: 0,
        }
    }

    fn open_temp_store() -> TelemetryStore {
        let dir = tempfile::tempdir().unwrap();
        TelemetryStore::open(dir.path()).unwrap()
    }

    fn push_value(store: &TelemetryStore, device_id: u64, tag_id: u64, ts: i64, v: f64) {
        use crate::types::{TelemetryPoint, Value};
        store.append_batch(&[TelemetryPoint {
            device_id,
            tag_id,
            ts,
            seq: 0,
            value: Value::F64(v),
            quality: 192,
            protocol: "opcua".into(),
            source: "edge-1".into(),
        }]);
    }

    #[test]
    fn full_cycle_opens_and_closes_segment() {
        let engine = CollectionEngine::new();
        engine.set_rules(vec![rule(1, 0)]);
        let store = open_temp_store();

        push_value(&store, 1, 1, 0, 100.0);
        let events = engine.tick(&store, 0);
        assert!(matches!(events[0], CollectionEvent::SegmentOpened(_)));
        assert_eq!(engine.open_segments().len(), 1);

        push_value(&store, 1, 1, 1000, 10.0);
        let events = engine.tick(&store, 1000);
        assert!(matches!(events[0], CollectionEvent::SegmentClosed(_)));
        assert_eq!(engine.open_segments().len(), 0);
    }

    #[test]
    fn stop_condition_must_hold_for_full_duration() {
        let engine = CollectionEngine::new();
        engine.set_rules(vec![rule(1, 5000)]);
        let store = open_temp_store();

        push_value(&store, 1, 1, 0, 100.0);
        engine.tick(&store, 0);

        push_value(&store, 1, 1, 1000, 10.0);
        let events = engine.tick(&store, 1000);
        assert!(events.is_empty());

        push_value(&store, 1, 1, 3000, 100.0);
        let events = engine.tick(&store, 3000);
        assert!(events.is_empty());
        assert_eq!(engine.open_segments().len(), 1);
    }

    #[test]
    fn shutdown_finalizes_open_segments() {
        let engine = CollectionEngine::new();
        engine.set_rules(vec![rule(1, 0)]);
        let store = open_temp_store();
        push_value(&store, 1, 1, 0, 100.0);
        engine.tick(&store, 0);
        assert_eq!(engine.open_segments().len(), 1);
        let events = engine.shutdown(500);
        assert_eq!(events.len(), 1);
        assert_eq!(engine.open_segments().len(), 0);
    }
}
