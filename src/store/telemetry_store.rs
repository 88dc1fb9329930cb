//! The embedded telemetry store: an ordered key-value store (`sled`, the
//! engine this codebase standardizes on for persistence — ground:
//! `storage/history.rs`) keyed by a byte-encoded `(device_id, tag_id, ts,
//! seq)` tuple so that `Tree::range` scans satisfy both aggregation
//! bucketing and keyset pagination directly, with no secondary index.

use std::sync::Arc;
use std::time::Instant;

use crate::error::{ErrorCode, OperationResult, StoreError};
use crate::types::{
    AggregateBucket, AggregateFunc, HistoryQuery, PagedResult, PageToken, SortDir, TelemetryPoint,
};

use super::keys;

/// Summary statistics mirroring the teacher's `StorageStats`, generalized
/// from "report count" to "point count".
#[derive(Debug, Clone)]
pub struct StorageStats {
    pub point_count: u64,
    pub size_bytes: u64,
    pub oldest_ts: Option<i64>,
    pub newest_ts: Option<i64>,
}

/// The telemetry store. Cheap to clone — wraps an `Arc<sled::Db>` the way
/// the teacher's `HistoryStorage` wraps its db handle.
#[derive(Clone)]
pub struct TelemetryStore {
    db: Arc<sled::Db>,
    tree: sled::Tree,
}

/// Above this latency a successful call is still logged as `DB_SLOW`-adjacent
/// and a failed call is classified `DbSlow` instead of `DbUnavailable`.
const SLOW_LATENCY: std::time::Duration =
    std::time::Duration::from_millis(crate::config::defaults::DB_SLOW_LATENCY_MS);

impl TelemetryStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let tree = db.open_tree("telemetry")?;
        Ok(Self {
            db: Arc::new(db),
            tree,
        })
    }

    fn classify_error(started: Instant, e: StoreError) -> ErrorCode {
        if started.elapsed() >= SLOW_LATENCY {
            ErrorCode::DbSlow
        } else {
            ErrorCode::from(&e)
        }
    }

    /// Idempotent bulk insert. A point whose key already exists is silently
    /// skipped (compare-and-swap against "absent"). Returns the count
    /// actually stored.
    pub fn append_batch(&self, points: &[TelemetryPoint]) -> OperationResult<usize> {
        let started = Instant::now();
        let mut stored = 0usize;
        for point in points {
            let key = keys::encode_point_key(&point.key());
            let value = match serde_json::to_vec(point) {
                Ok(v) => v,
                Err(e) => {
                    return OperationResult::fail(
                        ErrorCode::DbConstraint,
                        format!("failed to serialize telemetry point: {e}"),
                    )
                }
            };
            match self.tree.compare_and_swap(key, None as Option<&[u8]>, Some(value)) {
                Ok(Ok(())) => stored += 1,
                Ok(Err(_)) => {
                    // key already present — idempotent skip
                }
                Err(e) => {
                    let code = Self::classify_error(started, StoreError::from(e));
                    return OperationResult::fail(code, "telemetry store write failed");
                }
            }
        }
        if let Err(e) = self.tree.flush() {
            let code = Self::classify_error(started, StoreError::from(e));
            return OperationResult::fail(code, "telemetry store flush failed");
        }
        if started.elapsed() >= SLOW_LATENCY {
            tracing::warn!(elapsed_ms = started.elapsed().as_millis() as u64, "slow telemetry append_batch");
        }
        OperationResult::ok(stored)
    }

    /// Keyset-paginated history query. Overfetches by one row to determine
    /// `has_more` and derive `next_token` without a COUNT(*).
    pub fn query(&self, q: &HistoryQuery) -> OperationResult<PagedResult<TelemetryPoint>> {
        let started = Instant::now();
        let raw = match self.collect_range(q) {
            Ok(v) => v,
            Err(e) => {
                let code = Self::classify_error(started, e);
                return OperationResult::fail(code, "telemetry store query failed");
            }
        };

        let fetch_limit = q.limit.saturating_add(1);
        let mut items: Vec<TelemetryPoint> = raw.into_iter().take(fetch_limit).collect();
        let has_more = items.len() > q.limit;
        if has_more {
            items.truncate(q.limit);
        }
        let next_token = has_more.then(|| items.last().map(|p| PageToken::from_key(p.key()))).flatten();

        if started.elapsed() >= SLOW_LATENCY {
            tracing::warn!(elapsed_ms = started.elapsed().as_millis() as u64, "slow telemetry query");
        }

        OperationResult::ok(PagedResult {
            total_count: items.len(),
            items,
            next_token,
            has_more,
        })
    }

    /// Collect every point matching the query's device/tag/time range,
    /// already in `(ts, seq)` order, before pagination is applied.
    fn collect_range(&self, q: &HistoryQuery) -> Result<Vec<TelemetryPoint>, StoreError> {
        let mut points = match q.tag_id {
            Some(tag_id) => self.scan_device_tag(q.device_id, tag_id, q.start_ts, q.end_ts)?,
            None => {
                // No single tag means no contiguous key range; fall back to a
                // full device-prefix scan merged and sorted in memory.
                self.scan_device_all_tags(q.device_id, q.start_ts, q.end_ts)?
            }
        };

        if let Some(after) = &q.after {
            points.retain(|p| match q.sort {
                SortDir::Asc => (p.ts, p.seq) > (after.last_ts, after.last_seq),
                SortDir::Desc => (p.ts, p.seq) < (after.last_ts, after.last_seq),
            });
        }

        match q.sort {
            SortDir::Asc => points.sort_by_key(|p| (p.ts, p.seq)),
            SortDir::Desc => {
                points.sort_by_key(|p| (p.ts, p.seq));
                points.reverse();
            }
        }

        Ok(points)
    }

    fn scan_device_tag(
        &self,
        device_id: u64,
        tag_id: u64,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<TelemetryPoint>, StoreError> {
        let lower = keys::encode(device_id, tag_id, start_ts, 0);
        let upper = keys::encode(device_id, tag_id, end_ts, u64::MAX);
        let mut out = Vec::new();
        for kv in self.tree.range(lower..=upper) {
            let (_, value) = kv?;
            out.push(serde_json::from_slice::<TelemetryPoint>(&value)?);
        }
        Ok(out)
    }

    fn scan_device_all_tags(
        &self,
        device_id: u64,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<TelemetryPoint>, StoreError> {
        let lower = keys::encode(device_id, 0, i64::MIN, 0);
        let upper = keys::encode(device_id, u64::MAX, i64::MAX, u64::MAX);
        let mut out = Vec::new();
        for kv in self.tree.range(lower..=upper) {
            let (_, value) = kv?;
            let point: TelemetryPoint = serde_json::from_slice(&value)?;
            if point.ts >= start_ts && point.ts <= end_ts {
                out.push(point);
            }
        }
        Ok(out)
    }

    /// Most recent point for a device, optionally restricted to one tag.
    pub fn get_latest(&self, device_id: u64, tag_id: Option<u64>) -> OperationResult<Option<TelemetryPoint>> {
        let started = Instant::now();
        let result = match tag_id {
            Some(tag_id) => {
                let lower = keys::prefix_lower(device_id, tag_id);
                let upper = keys::prefix_upper(device_id, tag_id);
                self.tree
                    .range(lower..=upper)
                    .next_back()
                    .transpose()
                    .map_err(StoreError::from)
                    .and_then(|opt| {
                        opt.map(|(_, v)| serde_json::from_slice(&v).map_err(StoreError::from))
                            .transpose()
                    })
            }
            None => self
                .scan_device_all_tags(device_id, i64::MIN, i64::MAX)
                .map(|mut points| {
                    points.sort_by_key(|p| (p.ts, p.seq));
                    points.pop()
                }),
        };

        match result {
            Ok(v) => OperationResult::ok(v),
            Err(e) => {
                let code = Self::classify_error(started, e);
                OperationResult::fail(code, "telemetry store get_latest failed")
            }
        }
    }

    /// Bucket `[start_ts, end_ts)` into `interval_ms`-wide windows and
    /// reduce each with `func`. Ties within a bucket for `first`/`last`
    /// resolve on `(ts, seq)` ordering, matching the natural scan order.
    pub fn aggregate(
        &self,
        device_id: u64,
        tag_id: u64,
        start_ts: i64,
        end_ts: i64,
        interval_ms: i64,
        func: AggregateFunc,
    ) -> OperationResult<Vec<AggregateBucket>> {
        let started = Instant::now();
        let points = match self.scan_device_tag(device_id, tag_id, start_ts, end_ts) {
            Ok(v) => v,
            Err(e) => {
                let code = Self::classify_error(started, e);
                return OperationResult::fail(code, "telemetry store aggregate failed");
            }
        };

        let mut buckets: std::collections::BTreeMap<i64, Vec<f64>> = std::collections::BTreeMap::new();
        for p in &points {
            let Some(v) = p.value.as_f64() else { continue };
            let bucket_ts = (p.ts.div_euclid(interval_ms)) * interval_ms;
            buckets.entry(bucket_ts).or_default().push(v);
        }

        let result = buckets
            .into_iter()
            .map(|(bucket_ts, values)| {
                let value = reduce(&values, func);
                AggregateBucket {
                    bucket_ts,
                    value,
                    count: values.len() as u64,
                }
            })
            .collect();

        OperationResult::ok(result)
    }

    /// Raw numeric samples for `(device_id, tag_id)` in `[start_ts, end_ts]`,
    /// ordered by `(ts, seq)`. Used by the health, motor, and prognostics
    /// engines, which need the values themselves rather than a paginated
    /// `TelemetryPoint` listing.
    pub fn history_values(
        &self,
        device_id: u64,
        tag_id: u64,
        start_ts: i64,
        end_ts: i64,
    ) -> OperationResult<Vec<(i64, f64)>> {
        let started = Instant::now();
        match self.scan_device_tag(device_id, tag_id, start_ts, end_ts) {
            Ok(points) => {
                let values = points.into_iter().filter_map(|p| p.value.as_f64().map(|v| (p.ts, v))).collect();
                OperationResult::ok(values)
            }
            Err(e) => {
                let code = Self::classify_error(started, e);
                OperationResult::fail(code, "telemetry store history_values failed")
            }
        }
    }

    /// Delete every point with `ts < cutoff` across all devices/tags. Used by
    /// the retention worker. Returns the count deleted.
    pub fn delete_before(&self, cutoff: i64) -> OperationResult<u64> {
        let started = Instant::now();
        let mut to_delete = Vec::new();
        for kv in self.tree.iter() {
            let (key, _) = match kv {
                Ok(kv) => kv,
                Err(e) => {
                    let code = Self::classify_error(started, StoreError::from(e));
                    return OperationResult::fail(code, "telemetry store scan failed");
                }
            };
            let (_, _, ts, _) = keys::decode(&key);
            if ts < cutoff {
                to_delete.push(key);
            }
        }

        let mut deleted = 0u64;
        for key in &to_delete {
            match self.tree.remove(key) {
                Ok(_) => deleted += 1,
                Err(e) => {
                    let code = Self::classify_error(started, StoreError::from(e));
                    return OperationResult::fail(code, "telemetry store delete failed");
                }
            }
        }
        if deleted > 0 {
            let _ = self.tree.flush();
        }
        OperationResult::ok(deleted)
    }

    /// Every point with `ts` in `(start_ts_exclusive, end_ts_inclusive]`
    /// across all devices and tags. Used by the continuous-aggregation
    /// worker, which advances a single global cursor rather than one per
    /// `(device, tag)`. A full-table scan — acceptable for a periodic
    /// background pass, unlike the hot query/aggregate paths which stay
    /// within one device/tag's key prefix.
    pub fn scan_ts_range(&self, start_ts_exclusive: i64, end_ts_inclusive: i64) -> OperationResult<Vec<TelemetryPoint>> {
        let started = Instant::now();
        let mut out = Vec::new();
        for kv in self.tree.iter() {
            let (_, value) = match kv {
                Ok(kv) => kv,
                Err(e) => {
                    let code = Self::classify_error(started, StoreError::from(e));
                    return OperationResult::fail(code, "telemetry store scan failed");
                }
            };
            let point: TelemetryPoint = match serde_json::from_slice(&value) {
                Ok(p) => p,
                Err(e) => {
                    let code = Self::classify_error(started, StoreError::from(e));
                    return OperationResult::fail(code, "telemetry store decode failed");
                }
            };
            if point.ts > start_ts_exclusive && point.ts <= end_ts_inclusive {
                out.push(point);
            }
        }
        OperationResult::ok(out)
    }

    pub fn get_stats(&self) -> OperationResult<StorageStats> {
        let started = Instant::now();
        let point_count = self.tree.len() as u64;
        let size_bytes = self.db.size_on_disk().unwrap_or(0);

        let oldest_ts = self
            .tree
            .iter()
            .next()
            .and_then(|kv| kv.ok())
            .map(|(k, _)| keys::decode(&k).2);
        let newest_ts = self
            .tree
            .iter()
            .next_back()
            .and_then(|kv| kv.ok())
            .map(|(k, _)| keys::decode(&k).2);

        if started.elapsed() >= SLOW_LATENCY {
            tracing::warn!(elapsed_ms = started.elapsed().as_millis() as u64, "slow telemetry get_stats");
        }

        OperationResult::ok(StorageStats {
            point_count,
            size_bytes,
            oldest_ts,
            newest_ts,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.tree.flush()?;
        Ok(())
    }

    /// The shared database handle, for subsystems (retention) that need to
    /// open further trees alongside the raw telemetry one.
    pub fn db(&self) -> Arc<sled::Db> {
        Arc::clone(&self.db)
    }
}

fn reduce(values: &[f64], func: AggregateFunc) -> f64 {
    match func {
        AggregateFunc::Avg => values.iter().sum::<f64>() / values.len() as f64,
        AggregateFunc::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
        AggregateFunc::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        AggregateFunc::Sum => values.iter().sum(),
        AggregateFunc::Count => values.len() as f64,
        AggregateFunc::First => values.first().copied().unwrap_or(0.0),
        AggregateFunc::Last => values.last().copied().unwrap_or(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PointKey, Value};

    fn point(device_id: u64, tag_id: u64, ts: i64, seq: u64, v: f64) -> TelemetryPoint {
        TelemetryPoint {
            device_id,
            tag_id,
            ts,
            seq,
            value: Value::F64(v),
            quality: 192,
            protocol: "opcua".into(),
            source: "edge-1".into(),
        }
    }

    fn open_temp() -> TelemetryStore {
        let dir = tempfile::tempdir().unwrap();
        TelemetryStore::open(dir.path()).unwrap()
    }

    #[test]
    fn append_is_idempotent() {
        let store = open_temp();
        let p = point(1, 1, 1000, 0, 1.0);
        let r1 = store.append_batch(&[p.clone()]);
        let r2 = store.append_batch(&[p]);
        assert_eq!(r1.value, Some(1));
        assert_eq!(r2.value, Some(0));
    }

    #[test]
    fn query_paginates_with_overfetch() {
        let store = open_temp();
        let points: Vec<_> = (0..5).map(|i| point(1, 1, 1000 + i, 0, i as f64)).collect();
        store.append_batch(&points);

        let q = HistoryQuery {
            device_id: 1,
            tag_id: Some(1),
            start_ts: 0,
            end_ts: 10_000,
            sort: SortDir::Asc,
            limit: 2,
            after: None,
        };
        let page1 = store.query(&q).value.unwrap();
        assert_eq!(page1.items.len(), 2);
        assert!(page1.has_more);

        let q2 = HistoryQuery {
            after: page1.next_token.clone(),
            ..q.clone()
        };
        let page2 = store.query(&q2).value.unwrap();
        assert_eq!(page2.items[0].ts, 1002);

        // Final page: fewer rows than the limit, has_more=false, and no
        // next_token should be emitted alongside it (§4.1).
        let q3 = HistoryQuery {
            after: page2.next_token.clone(),
            ..q
        };
        let page3 = store.query(&q3).value.unwrap();
        assert!(!page3.has_more);
        assert!(page3.next_token.is_none());
    }

    #[test]
    fn query_respects_key_isolation_between_devices() {
        let store = open_temp();
        store.append_batch(&[point(1, 1, 1000, 0, 1.0), point(2, 1, 1000, 0, 2.0)]);
        let q = HistoryQuery {
            device_id: 1,
            tag_id: Some(1),
            start_ts: 0,
            end_ts: 10_000,
            sort: SortDir::Asc,
            limit: 10,
            after: None,
        };
        let page = store.query(&q).value.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].device_id, 1);
    }

    #[test]
    fn aggregate_buckets_by_interval() {
        let store = open_temp();
        store.append_batch(&[
            point(1, 1, 1000, 0, 10.0),
            point(1, 1, 1500, 1, 20.0),
            point(1, 1, 2000, 2, 30.0),
        ]);
        let buckets = store
            .aggregate(1, 1, 0, 10_000, 1000, AggregateFunc::Avg)
            .value
            .unwrap();
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].bucket_ts, 1000);
        assert_eq!(buckets[0].value, 15.0);
        assert_eq!(buckets[1].bucket_ts, 2000);
    }

    #[test]
    fn delete_before_removes_old_points_only() {
        let store = open_temp();
        store.append_batch(&[point(1, 1, 1000, 0, 1.0), point(1, 1, 5000, 0, 2.0)]);
        let deleted = store.delete_before(3000).value.unwrap();
        assert_eq!(deleted, 1);
        let stats = store.get_stats().value.unwrap();
        assert_eq!(stats.point_count, 1);
    }

    #[test]
    fn point_key_helper_matches_encode() {
        let key = PointKey {
            device_id: 1,
            tag_id: 2,
            ts: 3,
            seq: 4,
        };
        assert_eq!(keys::encode_point_key(&key), keys::encode(1, 2, 3, 4));
    }
}
