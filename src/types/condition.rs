//! Tagged-variant conditions for alarm rules and collection rules.
//!
//! Design note: the source system stored these as a JSON blob re-parsed on
//! every evaluation tick. Representing them as a proper enum removes that
//! round trip from the hot path and gives the compiler exhaustiveness
//! checking over the operator set.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
}

/// Tolerance used for `Eq`/`Ne` comparisons against floating-point tag
/// values (§4.3: `|Δ|<1e-4`).
pub const EQUALITY_TOLERANCE: f64 = 1e-4;

impl CompareOp {
    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CompareOp::Gt => lhs > rhs,
            CompareOp::Gte => lhs >= rhs,
            CompareOp::Lt => lhs < rhs,
            CompareOp::Lte => lhs <= rhs,
            CompareOp::Eq => (lhs - rhs).abs() < EQUALITY_TOLERANCE,
            CompareOp::Ne => (lhs - rhs).abs() >= EQUALITY_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Logic {
    And,
    Or,
}

/// A condition tree. `Duration` items are accounted for by the containing
/// state machine (collection rule / alarm rule), not by `Condition::eval` —
/// they express "the predicate above must have held for N seconds", which
/// requires history the evaluator owns, not the condition itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    And { items: Vec<Condition> },
    Or { items: Vec<Condition> },
    TagPred { tag_id: u64, op: CompareOp, value: f64 },
    Duration { seconds: u64 },
}

/// A stable snapshot of the latest numeric value (and timestamp) per tag,
/// refreshed once per evaluation tick so that a single tick sees a
/// consistent view across every rule it evaluates.
pub trait TagSnapshot {
    fn latest(&self, tag_id: u64) -> Option<(f64, i64)>;
}

impl Condition {
    /// Evaluate against a snapshot. `Duration` nodes are treated as `false`
    /// here since they carry no standalone truth value; callers that need
    /// duration semantics evaluate the non-duration predicate and track
    /// elapsed time themselves (see `collection` and `alarms`).
    pub fn eval(&self, snapshot: &dyn TagSnapshot) -> bool {
        match self {
            Condition::And { items } => {
                if items.is_empty() {
                    return false;
                }
                items.iter().all(|c| c.eval(snapshot))
            }
            Condition::Or { items } => {
                if items.is_empty() {
                    return false;
                }
                items.iter().any(|c| c.eval(snapshot))
            }
            Condition::TagPred { tag_id, op, value } => match snapshot.latest(*tag_id) {
                Some((v, _ts)) => op.apply(v, *value),
                None => false,
            },
            Condition::Duration { .. } => false,
        }
    }

    pub fn eval_with_logic(logic: Logic, items: &[Condition], snapshot: &dyn TagSnapshot) -> bool {
        match logic {
            Logic::And => Condition::And { items: items.to_vec() }.eval(snapshot),
            Logic::Or => Condition::Or { items: items.to_vec() }.eval(snapshot),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapSnapshot(HashMap<u64, (f64, i64)>);
    impl TagSnapshot for MapSnapshot {
        fn latest(&self, tag_id: u64) -> Option<(f64, i64)> {
            self.0.get(&tag_id).copied()
        }
    }

    #[test]
    fn empty_and_or_are_false() {
        let snap = MapSnapshot(HashMap::new());
        assert!(!Condition::And { items: vec![] }.eval(&snap));
        assert!(!Condition::Or { items: vec![] }.eval(&snap));
    }

    #[test]
    fn missing_tag_is_false() {
        let snap = MapSnapshot(HashMap::new());
        let c = Condition::TagPred { tag_id: 1, op: CompareOp::Gt, value: 10.0 };
        assert!(!c.eval(&snap));
    }

    #[test]
    fn and_requires_all() {
        let mut m = HashMap::new();
        m.insert(1, (12.0, 0));
        m.insert(2, (3.0, 0));
        let snap = MapSnapshot(m);
        let c = Condition::And {
            items: vec![
                Condition::TagPred { tag_id: 1, op: CompareOp::Gt, value: 10.0 },
                Condition::TagPred { tag_id: 2, op: CompareOp::Lt, value: 1.0 },
            ],
        };
        assert!(!c.eval(&snap));
    }

    #[test]
    fn eq_uses_tolerance() {
        let mut m = HashMap::new();
        m.insert(1, (10.00005, 0));
        let snap = MapSnapshot(m);
        let c = Condition::TagPred { tag_id: 1, op: CompareOp::Eq, value: 10.0 };
        assert!(c.eval(&snap));
    }
}
