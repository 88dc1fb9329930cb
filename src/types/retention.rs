//! Types backing the retention and continuous-aggregation worker (§4.9).

use serde::{Deserialize, Serialize};

/// One persisted rollup row: every reducer the aggregation worker computes
/// in a single pass over a bucket, so a downstream hourly pass can re-reduce
/// the minute table without re-scanning raw points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RollupBucket {
    pub bucket_ts: i64,
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub first: f64,
    pub last: f64,
    pub count: u64,
}

/// Resumable cursor for one continuous-aggregation table, keyed by the
/// table it advances. Persisted so a restarted worker resumes from
/// `last_processed_ts` instead of re-aggregating from the beginning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateState {
    pub last_processed_ts: i64,
}

impl Default for AggregateState {
    fn default() -> Self {
        Self { last_processed_ts: i64::MIN }
    }
}

/// Which rollup table an `AggregateState` row tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollupTable {
    Telemetry1m,
    Telemetry1h,
}

impl RollupTable {
    pub fn state_key(self) -> &'static str {
        match self {
            RollupTable::Telemetry1m => "telemetry_1m",
            RollupTable::Telemetry1h => "telemetry_1h",
        }
    }
}
