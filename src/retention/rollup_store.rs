//! Sled-backed storage for the continuous-aggregation tables (§4.9): the
//! per-minute and per-hour rollup trees, plus the `aggregate_state` cursor
//! tree that makes the aggregation worker resumable. Ground: the same
//! `(device, tag, bucket_ts)` key encoding the raw telemetry store uses, so
//! keyset range scans work identically across all three granularities.

use std::sync::Arc;

use crate::error::StoreError;
use crate::store::{delete_before_tree, keys, Deletable};
use crate::types::{AggregateState, RollupBucket, RollupTable};

/// One rollup tree (`telemetry_1m` or `telemetry_1h`), keyed the same way
/// the raw telemetry store is, with `seq` fixed at `0` since a bucket is
/// unique per `(device, tag, bucket_ts)`.
pub struct RollupStore {
    tree: sled::Tree,
}

impl RollupStore {
    pub fn open(db: &Arc<sled::Db>, table: RollupTable) -> Result<Self, StoreError> {
        let tree = db.open_tree(table.state_key())?;
        Ok(Self { tree })
    }

    /// Merge `bucket` into whatever is already stored at its key — if the
    /// bucket has been touched by an earlier pass (the worker restarted
    /// mid-bucket, or a point landed in an already-rolled-up minute), the
    /// min/max/sum/count reducers combine rather than overwrite.
    pub fn merge(&self, device_id: u64, tag_id: u64, bucket: RollupBucket) -> Result<(), StoreError> {
        let key = keys::encode(device_id, tag_id, bucket.bucket_ts, 0);
        let merged = match self.tree.get(key)? {
            Some(existing) => {
                let prev: RollupBucket = serde_json::from_slice(&existing)?;
                combine(prev, bucket)
            }
            None => bucket,
        };
        let value = serde_json::to_vec(&merged)?;
        self.tree.insert(key, value)?;
        Ok(())
    }

    pub fn get(&self, device_id: u64, tag_id: u64, bucket_ts: i64) -> Result<Option<RollupBucket>, StoreError> {
        let key = keys::encode(device_id, tag_id, bucket_ts, 0);
        match self.tree.get(key)? {
            Some(v) => Ok(Some(serde_json::from_slice(&v)?)),
            None => Ok(None),
        }
    }

    /// Every bucket for `(device, tag)` in `[start_ts, end_ts]`, ordered by
    /// `bucket_ts`. Used by the hourly pass reading out of the minute table.
    pub fn range(&self, device_id: u64, tag_id: u64, start_ts: i64, end_ts: i64) -> Result<Vec<(i64, RollupBucket)>, StoreError> {
        let lower = keys::encode(device_id, tag_id, start_ts, 0);
        let upper = keys::encode(device_id, tag_id, end_ts, u64::MAX);
        let mut out = Vec::new();
        for kv in self.tree.range(lower..=upper) {
            let (key, value) = kv?;
            let (_, _, bucket_ts, _) = keys::decode(&key);
            out.push((bucket_ts, serde_json::from_slice::<RollupBucket>(&value)?));
        }
        Ok(out)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.tree.flush()?;
        Ok(())
    }

    /// Every `(device_id, tag_id, bucket)` row across the whole tree with
    /// `bucket_ts` in `(start_ts_exclusive, end_ts_inclusive]`. Used by the
    /// hourly pass, which folds in every device/tag's minute buckets rather
    /// than one device/tag at a time.
    pub fn scan_ts_range(&self, start_ts_exclusive: i64, end_ts_inclusive: i64) -> Result<Vec<(u64, u64, RollupBucket)>, StoreError> {
        let mut out = Vec::new();
        for kv in self.tree.iter() {
            let (key, value) = kv?;
            let (device_id, tag_id, bucket_ts, _) = keys::decode(&key);
            if bucket_ts > start_ts_exclusive && bucket_ts <= end_ts_inclusive {
                out.push((device_id, tag_id, serde_json::from_slice::<RollupBucket>(&value)?));
            }
        }
        Ok(out)
    }
}

impl Deletable for RollupStore {
    fn delete_before(&self, cutoff: i64) -> crate::error::OperationResult<u64> {
        match delete_before_tree(&self.tree, cutoff) {
            Ok(n) => crate::error::OperationResult::ok(n),
            Err(e) => crate::error::OperationResult::fail(crate::error::ErrorCode::from(&e), "rollup store delete failed"),
        }
    }
}

fn combine(a: RollupBucket, b: RollupBucket) -> RollupBucket {
    debug_assert_eq!(a.bucket_ts, b.bucket_ts);
    let total = a.count + b.count;
    RollupBucket {
        bucket_ts: a.bucket_ts,
        min: a.min.min(b.min),
        max: a.max.max(b.max),
        avg: if total > 0 { (a.avg * a.count as f64 + b.avg * b.count as f64) / total as f64 } else { 0.0 },
        // `b` carries the later arrivals, so its `first`/`last` win when it
        // has any samples; otherwise fall back to `a`'s.
        first: if a.count > 0 { a.first } else { b.first },
        last: if b.count > 0 { b.last } else { a.last },
        count: total,
    }
}

/// The per-table resumption cursor.
pub struct AggregateStateStore {
    tree: sled::Tree,
}

impl AggregateStateStore {
    pub fn open(db: &Arc<sled::Db>) -> Result<Self, StoreError> {
        let tree = db.open_tree("aggregate_state")?;
        Ok(Self { tree })
    }

    pub fn get(&self, table: RollupTable) -> Result<AggregateState, StoreError> {
        match self.tree.get(table.state_key())? {
            Some(v) => Ok(serde_json::from_slice(&v)?),
            None => Ok(AggregateState::default()),
        }
    }

    pub fn set(&self, table: RollupTable, state: AggregateState) -> Result<(), StoreError> {
        let value = serde_json::to_vec(&state)?;
        self.tree.insert(table.state_key(), value)?;
        self.tree.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_db() -> Arc<sled::Db> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(sled::open(dir.path()).unwrap())
    }

    #[test]
    fn merge_combines_overlapping_buckets() {
        let db = open_db();
        let store = RollupStore::open(&db, RollupTable::Telemetry1m).unwrap();
        store
            .merge(1, 1, RollupBucket { bucket_ts: 0, min: 1.0, max: 3.0, avg: 2.0, first: 1.0, last: 3.0, count: 2 })
            .unwrap();
        store
            .merge(1, 1, RollupBucket { bucket_ts: 0, min: 0.5, max: 4.0, avg: 2.0, first: 2.0, last: 4.0, count: 1 })
            .unwrap();
        let bucket = store.get(1, 1, 0).unwrap().unwrap();
        assert_eq!(bucket.min, 0.5);
        assert_eq!(bucket.max, 4.0);
        assert_eq!(bucket.count, 3);
        assert_eq!(bucket.last, 4.0);
    }

    #[test]
    fn state_round_trips_through_default() {
        let db = open_db();
        let state_store = AggregateStateStore::open(&db).unwrap();
        let initial = state_store.get(RollupTable::Telemetry1m).unwrap();
        assert_eq!(initial.last_processed_ts, i64::MIN);

        state_store.set(RollupTable::Telemetry1m, AggregateState { last_processed_ts: 1_000 }).unwrap();
        let after = state_store.get(RollupTable::Telemetry1m).unwrap();
        assert_eq!(after.last_processed_ts, 1_000);
    }
}
