//! Alarm rules, records, and groups (§3, §4.4).

use serde::{Deserialize, Serialize};

use super::condition::CompareOp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Threshold,
    Offline,
    Roc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RocMode {
    Percent,
    Absolute,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmRule {
    pub rule_id: u64,
    pub tag_id: u64,
    pub device_id: Option<u64>,
    pub rule_type: RuleType,
    /// Present for threshold rules; ignored for offline/ROC.
    pub condition: Option<CompareOp>,
    pub threshold: f64,
    pub duration_ms: u64,
    pub severity: u8,
    pub roc_window_ms: u64,
    pub roc_mode: Option<RocMode>,
    pub message_template: String,
    pub enabled: bool,
    pub updated_utc: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmStatus {
    Open,
    Acknowledged,
    Closed,
}

impl AlarmStatus {
    /// Status transitions may only proceed Open→Acknowledged→Closed, or
    /// Open→Closed. Any other requested transition is rejected.
    pub fn can_transition_to(self, next: AlarmStatus) -> bool {
        matches!(
            (self, next),
            (AlarmStatus::Open, AlarmStatus::Acknowledged)
                | (AlarmStatus::Open, AlarmStatus::Closed)
                | (AlarmStatus::Acknowledged, AlarmStatus::Closed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmRecord {
    pub alarm_id: u64,
    pub device_id: u64,
    pub tag_id: Option<u64>,
    pub ts: i64,
    pub severity: u8,
    pub code: u64,
    pub message: String,
    pub status: AlarmStatus,
    pub created: i64,
    pub updated: i64,
    pub acked_by: Option<String>,
    pub acked_ts: Option<i64>,
    pub ack_note: Option<String>,
}

impl AlarmRecord {
    pub fn ack(&mut self, now: i64, user: &str, note: Option<String>) -> bool {
        if self.status == AlarmStatus::Closed {
            return false;
        }
        self.status = AlarmStatus::Acknowledged;
        self.acked_by = Some(user.to_string());
        self.acked_ts = Some(now);
        self.ack_note = note;
        self.updated = now;
        true
    }

    pub fn close(&mut self, now: i64) -> bool {
        if self.status == AlarmStatus::Closed {
            return false;
        }
        self.status = AlarmStatus::Closed;
        self.updated = now;
        true
    }
}

/// An aggregation of alarms sharing `(device_id, rule_id)` while not closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmGroup {
    pub group_id: u64,
    pub device_id: u64,
    pub rule_id: u64,
    pub alarm_count: u64,
    pub first_occurred: i64,
    pub last_occurred: i64,
    /// Highest severity seen across all child alarms. Only ever raised,
    /// per the resolved Open Question (no downgrade path) — see DESIGN.md.
    pub severity: u8,
    pub status: AlarmStatus,
    pub member_alarm_ids: Vec<u64>,
}

impl AlarmGroup {
    pub fn new(group_id: u64, device_id: u64, rule_id: u64, alarm: &AlarmRecord) -> Self {
        Self {
            group_id,
            device_id,
            rule_id,
            alarm_count: 1,
            first_occurred: alarm.ts,
            last_occurred: alarm.ts,
            severity: alarm.severity,
            status: AlarmStatus::Open,
            member_alarm_ids: vec![alarm.alarm_id],
        }
    }

    pub fn attach(&mut self, alarm: &AlarmRecord) {
        self.alarm_count += 1;
        self.last_occurred = alarm.ts;
        self.severity = self.severity.max(alarm.severity);
        self.member_alarm_ids.push(alarm.alarm_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(severity: u8, ts: i64) -> AlarmRecord {
        AlarmRecord {
            alarm_id: 1,
            device_id: 1,
            tag_id: Some(1),
            ts,
            severity,
            code: 1,
            message: "test".into(),
            status: AlarmStatus::Open,
            created: ts,
            updated: ts,
            acked_by: None,
            acked_ts: None,
            ack_note: None,
        }
    }

    #[test]
    fn group_severity_never_downgrades() {
        let mut g = AlarmGroup::new(1, 1, 1, &rec(3, 0));
        g.attach(&rec(1, 10));
        assert_eq!(g.severity, 3);
        g.attach(&rec(5, 20));
        assert_eq!(g.severity, 5);
        assert_eq!(g.alarm_count, 3);
    }

    #[test]
    fn closed_alarm_ack_is_noop() {
        let mut a = rec(3, 0);
        assert!(a.close(100));
        assert!(!a.ack(200, "op", None));
        assert_eq!(a.status, AlarmStatus::Closed);
    }

    #[test]
    fn double_close_is_idempotent() {
        let mut a = rec(3, 0);
        assert!(a.close(100));
        assert!(!a.close(200));
    }

    #[test]
    fn status_transitions_are_forward_only() {
        assert!(AlarmStatus::Open.can_transition_to(AlarmStatus::Acknowledged));
        assert!(AlarmStatus::Open.can_transition_to(AlarmStatus::Closed));
        assert!(AlarmStatus::Acknowledged.can_transition_to(AlarmStatus::Closed));
        assert!(!AlarmStatus::Closed.can_transition_to(AlarmStatus::Open));
        assert!(!AlarmStatus::Acknowledged.can_transition_to(AlarmStatus::Open));
    }
}
