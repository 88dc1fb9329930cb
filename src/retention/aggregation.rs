//! Continuous aggregation worker (§4.9): rolls raw telemetry into per-minute
//! buckets, then per-hour buckets from the minute table, advancing a
//! persisted cursor after each pass so a restart resumes instead of
//! re-scanning from the beginning. Ground: the teacher's periodic
//! `background` tasks (`tokio::time::interval` + `CancellationToken`), same
//! shape as `edge::link`'s sender/monitor loops.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::defaults;
use crate::error::RetentionError;
use crate::store::TelemetryStore;
use crate::types::{AggregateState, RollupBucket, RollupTable};

use super::rollup_store::{AggregateStateStore, RollupStore};

pub struct AggregationWorker {
    store: TelemetryStore,
    minute: RollupStore,
    hour: RollupStore,
    state: AggregateStateStore,
    cancel: CancellationToken,
}

impl AggregationWorker {
    pub fn new(store: TelemetryStore) -> Result<Arc<Self>, RetentionError> {
        let db = store.db();
        let minute = RollupStore::open(&db, RollupTable::Telemetry1m)?;
        let hour = RollupStore::open(&db, RollupTable::Telemetry1h)?;
        let state = AggregateStateStore::open(&db)?;
        Ok(Arc::new(Self { store, minute, hour, state, cancel: CancellationToken::new() }))
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// For the retention cleanup worker's "never delete not-yet-aggregated
    /// data" guard.
    pub fn minute_cursor(&self) -> Result<AggregateState, RetentionError> {
        Ok(self.state.get(RollupTable::Telemetry1m)?)
    }

    pub fn hour_cursor(&self) -> Result<AggregateState, RetentionError> {
        Ok(self.state.get(RollupTable::Telemetry1h)?)
    }

    pub async fn run(self: Arc<Self>) {
        let cfg = crate::config::get();
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(cfg.data_cleanup.aggregation_interval_secs));
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let now_ms = chrono::Utc::now().timestamp_millis();
                    if let Err(e) = self.run_once(now_ms) {
                        warn!(error = %e, "aggregation pass failed");
                    }
                }
            }
        }
    }

    pub fn run_once(&self, now_ms: i64) -> Result<(), RetentionError> {
        self.aggregate_minute(now_ms)?;
        self.aggregate_hour(now_ms)?;
        Ok(())
    }

    fn aggregate_minute(&self, now_ms: i64) -> Result<(), RetentionError> {
        let cursor = self.state.get(RollupTable::Telemetry1m)?;
        let result = self.store.scan_ts_range(cursor.last_processed_ts, now_ms);
        if !result.success {
            return Err(RetentionError::Operation(result.error_message.unwrap_or_default()));
        }
        let points = result.value.unwrap_or_default();
        if points.is_empty() {
            return Ok(());
        }

        let mut buckets: HashMap<(u64, u64, i64), Vec<(i64, f64)>> = HashMap::new();
        let mut max_ts = cursor.last_processed_ts;
        for p in &points {
            max_ts = max_ts.max(p.ts);
            let Some(v) = p.value.as_f64() else { continue };
            let bucket_ts = p.ts.div_euclid(defaults::MINUTE_BUCKET_MS) * defaults::MINUTE_BUCKET_MS;
            buckets.entry((p.device_id, p.tag_id, bucket_ts)).or_default().push((p.ts, v));
        }

        for ((device_id, tag_id, bucket_ts), mut samples) in buckets {
            samples.sort_by_key(|(ts, _)| *ts);
            self.minute.merge(device_id, tag_id, reduce_bucket(bucket_ts, &samples))?;
        }
        self.minute.flush()?;
        self.state.set(RollupTable::Telemetry1m, AggregateState { last_processed_ts: max_ts })?;
        info!(processed = points.len(), "minute aggregation pass complete");
        Ok(())
    }

    fn aggregate_hour(&self, now_ms: i64) -> Result<(), RetentionError> {
        let cursor = self.state.get(RollupTable::Telemetry1h)?;
        let minute_buckets = self.minute.scan_ts_range(cursor.last_processed_ts, now_ms)?;
        if minute_buckets.is_empty() {
            return Ok(());
        }

        let mut groups: HashMap<(u64, u64, i64), Vec<RollupBucket>> = HashMap::new();
        let mut max_ts = cursor.last_processed_ts;
        for (device_id, tag_id, bucket) in minute_buckets {
            max_ts = max_ts.max(bucket.bucket_ts);
            let hour_ts = bucket.bucket_ts.div_euclid(defaults::HOUR_BUCKET_MS) * defaults::HOUR_BUCKET_MS;
            groups.entry((device_id, tag_id, hour_ts)).or_default().push(bucket);
        }

        for ((device_id, tag_id, hour_ts), mut minutes) in groups {
            minutes.sort_by_key(|b| b.bucket_ts);
            self.hour.merge(device_id, tag_id, fold_minutes(hour_ts, &minutes))?;
        }
        self.hour.flush()?;
        self.state.set(RollupTable::Telemetry1h, AggregateState { last_processed_ts: max_ts })?;
        Ok(())
    }
}

fn reduce_bucket(bucket_ts: i64, samples: &[(i64, f64)]) -> RollupBucket {
    let count = samples.len() as u64;
    let min = samples.iter().map(|(_, v)| *v).fold(f64::INFINITY, f64::min);
    let max = samples.iter().map(|(_, v)| *v).fold(f64::NEG_INFINITY, f64::max);
    let sum: f64 = samples.iter().map(|(_, v)| v).sum();
    RollupBucket {
        bucket_ts,
        min,
        max,
        avg: sum / count as f64,
        first: samples.first().unwrap().1,
        last: samples.last().unwrap().1,
        count,
    }
}

fn fold_minutes(hour_ts: i64, minutes: &[RollupBucket]) -> RollupBucket {
    let count: u64 = minutes.iter().map(|b| b.count).sum();
    let min = minutes.iter().map(|b| b.min).fold(f64::INFINITY, f64::min);
    let max = minutes.iter().map(|b| b.max).fold(f64::NEG_INFINITY, f64::max);
    let weighted_sum: f64 = minutes.iter().map(|b| b.avg * b.count as f64).sum();
    RollupBucket {
        bucket_ts: hour_ts,
        min,
        max,
        avg: if count > 0 { weighted_sum / count as f64 } else { 0.0 },
        first: minutes.first().map(|b| b.first).unwrap_or(0.0),
        last: minutes.last().map(|b| b.last).unwrap_or(0.0),
        count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TelemetryPoint, Value};

    fn open_store() -> TelemetryStore {
        let dir = tempfile::tempdir().unwrap();
        TelemetryStore::open(dir.path()).unwrap()
    }

    fn point(device_id: u64, tag_id: u64, ts: i64, v: f64) -> TelemetryPoint {
        TelemetryPoint { device_id, tag_id, ts, seq: 0, value: Value::F64(v), quality: 192, protocol: "sim".into(), source: "test".into() }
    }

    #[test]
    fn minute_pass_buckets_and_advances_cursor() {
        let store = open_store();
        store.append_batch(&[point(1, 1, 1_000, 10.0), point(1, 1, 30_000, 20.0), point(1, 1, 90_000, 30.0)]);
        let worker = AggregationWorker::new(store).unwrap();

        worker.run_once(100_000).unwrap();

        let cursor = worker.minute_cursor().unwrap();
        assert_eq!(cursor.last_processed_ts, 90_000);

        let bucket = worker.minute.get(1, 1, 0).unwrap().unwrap();
        assert_eq!(bucket.count, 2);
        assert_eq!(bucket.min, 10.0);
        assert_eq!(bucket.max, 20.0);
    }

    #[test]
    fn hour_pass_folds_minute_buckets() {
        let store = open_store();
        let points: Vec<_> = (0..5).map(|m| point(1, 1, m * 60_000, m as f64)).collect();
        store.append_batch(&points);
        let worker = AggregationWorker::new(store).unwrap();
        worker.run_once(5 * 60_000).unwrap();

        let hour_bucket = worker.hour.get(1, 1, 0).unwrap().unwrap();
        assert_eq!(hour_bucket.count, 5);
        assert_eq!(hour_bucket.min, 0.0);
        assert_eq!(hour_bucket.max, 4.0);
    }

    #[test]
    fn empty_window_is_a_no_op() {
        let store = open_store();
        let worker = AggregationWorker::new(store).unwrap();
        worker.run_once(1_000).unwrap();
        assert_eq!(worker.minute_cursor().unwrap().last_processed_ts, i64::MIN);
    }
}
