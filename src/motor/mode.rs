//! Operation mode detection: a sliding classifier over a trigger-tag sample
//! stream, grounded on the condition-driven segment state machine in
//! `collection/engine.rs` (same priority/duration gating shape, applied here
//! to motor phase classification instead of buffer collection).

use std::collections::HashMap;

use crate::types::OperationMode;

/// Tracks, per trigger tag, how long its value has continuously sat inside
/// a candidate mode's `[trigger_min, trigger_max]` band.
#[derive(Debug, Default)]
struct CandidateRun {
    mode_id: u64,
    since_ts: i64,
}

/// Resolves which `OperationMode` a motor instance is currently in from a
/// stream of `(timestamp_ms, trigger_value)` samples for each mode's trigger
/// tag. Modes are checked in descending `priority` (ties broken by
/// declaration order, i.e. input order); the first whose trigger has sat in
/// range for at least `min_duration_ms`, and not longer than `max_duration_ms`
/// when that is nonzero, wins.
pub struct ModeDetector {
    modes: Vec<OperationMode>,
    runs: HashMap<u64, CandidateRun>,
    current: Option<u64>,
}

impl ModeDetector {
    /// `modes` must already be associated with the same motor instance;
    /// ordering is preserved as the tie-break for equal priority.
    pub fn new(mut modes: Vec<OperationMode>) -> Self {
        modes.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { modes, runs: HashMap::new(), current: None }
    }

    pub fn current_mode(&self) -> Option<u64> {
        self.current
    }

    /// Feed one `(trigger_tag_id, value, timestamp_ms)` observation. Returns
    /// the resolved mode id if the detector's current mode changed.
    pub fn observe(&mut self, trigger_tag_id: u64, value: f64, ts_ms: i64) -> Option<u64> {
        for mode in &self.modes {
            if mode.trigger_tag_id != trigger_tag_id {
                continue;
            }
            let run = self.runs.entry(mode.mode_id).or_insert(CandidateRun { mode_id: mode.mode_id, since_ts: ts_ms });
            if mode.in_range(value) {
                let elapsed = (ts_ms - run.since_ts).max(0) as u64;
                let within_max = mode.max_duration_ms == 0 || elapsed <= mode.max_duration_ms;
                if elapsed >= mode.min_duration_ms && within_max {
                    if self.current != Some(mode.mode_id) {
                        self.current = Some(mode.mode_id);
                        return self.current;
                    }
                    return None;
                }
            } else {
                run.since_ts = ts_ms;
            }
        }
        None
    }

    /// Resolve the mode for a single instantaneous reading per trigger tag,
    /// ignoring duration gating entirely (used when classifying a historical
    /// window all at once rather than a live stream).
    pub fn classify_instant(modes: &[OperationMode], readings: &HashMap<u64, f64>) -> Option<u64> {
        let mut ordered: Vec<&OperationMode> = modes.iter().collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));
        for mode in ordered {
            if let Some(&value) = readings.get(&mode.trigger_tag_id) {
                if mode.in_range(value) {
                    return Some(mode.mode_id);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(id: u64, trigger_tag: u64, min: f64, max: f64, priority: i32, min_dur_ms: u64) -> OperationMode {
        OperationMode {
            mode_id: id,
            instance_id: 1,
            name: format!("mode-{id}"),
            trigger_tag_id: trigger_tag,
            trigger_min: min,
            trigger_max: max,
            min_duration_ms: min_dur_ms,
            max_duration_ms: 0,
            priority,
        }
    }

    #[test]
    fn resolves_after_min_duration_elapses() {
        let mut detector = ModeDetector::new(vec![mode(1, 10, 0.0, 5.0, 0, 2000)]);
        assert_eq!(detector.observe(10, 1.0, 0), None);
        assert_eq!(detector.observe(10, 1.0, 1000), None);
        assert_eq!(detector.observe(10, 1.0, 2000), Some(1));
    }

    #[test]
    fn higher_priority_mode_wins_on_instant_classification() {
        let modes = vec![mode(1, 10, 0.0, 100.0, 0, 0), mode(2, 10, 40.0, 60.0, 10, 0)];
        let mut readings = HashMap::new();
        readings.insert(10, 50.0);
        assert_eq!(ModeDetector::classify_instant(&modes, &readings), Some(2));
    }

    #[test]
    fn equal_priority_resolves_to_declaration_order() {
        let modes = vec![mode(1, 10, 0.0, 100.0, 5, 0), mode(2, 10, 40.0, 60.0, 5, 0)];
        let mut readings = HashMap::new();
        readings.insert(10, 50.0);
        assert_eq!(ModeDetector::classify_instant(&modes, &readings), Some(1));
    }

    #[test]
    fn leaving_range_resets_the_run() {
        let mut detector = ModeDetector::new(vec![mode(1, 10, 0.0, 5.0, 0, 2000)]);
        assert_eq!(detector.observe(10, 1.0, 0), None);
        assert_eq!(detector.observe(10, 9.0, 500), None);
        assert_eq!(detector.observe(10, 1.0, 600), None);
        assert_eq!(detector.observe(10, 1.0, 2600), Some(1));
    }
}
