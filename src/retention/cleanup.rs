//! TTL cleanup worker (§4.9): deletes raw telemetry, minute/hour rollups,
//! alarms, audit log rows and health snapshots past their configured
//! retention window, always respecting the guard that not-yet-aggregated
//! data is never deleted out from under the aggregation worker. Ground: the
//! teacher's periodic maintenance tasks, same `interval` + `CancellationToken`
//! shape as the aggregation worker.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::DataCleanupConfig;
use crate::error::RetentionError;
use crate::store::Deletable;

use super::aggregation::AggregationWorker;

const MS_PER_DAY: i64 = 86_400_000;

/// One cleanup target: a `Deletable` store plus the retention window it
/// should be pruned to.
pub struct CleanupTarget {
    pub name: &'static str,
    pub store: Arc<dyn Deletable + Send + Sync>,
    pub retention_days: u64,
}

pub struct CleanupWorker {
    aggregation: Arc<AggregationWorker>,
    raw: CleanupTarget,
    minute: CleanupTarget,
    hour: CleanupTarget,
    extra: Vec<CleanupTarget>,
    cfg: DataCleanupConfig,
    total_deleted: AtomicU64,
}

impl CleanupWorker {
    pub fn new(
        aggregation: Arc<AggregationWorker>,
        raw: CleanupTarget,
        minute: CleanupTarget,
        hour: CleanupTarget,
        extra: Vec<CleanupTarget>,
        cfg: DataCleanupConfig,
    ) -> Self {
        Self { aggregation, raw, minute, hour, extra, cfg, total_deleted: AtomicU64::new(0) }
    }

    pub async fn run(self: Arc<Self>, cancel: tokio_util::sync::CancellationToken) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(self.cfg.cleanup_interval_hours * 3_600));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let now_ms = chrono::Utc::now().timestamp_millis();
                    if let Err(e) = self.run_once(now_ms) {
                        warn!(error = %e, "cleanup pass failed");
                    }
                }
            }
        }
    }

    pub fn run_once(&self, now_ms: i64) -> Result<(), RetentionError> {
        let minute_cursor = self.aggregation.minute_cursor()?;
        let hour_cursor = self.aggregation.hour_cursor()?;

        let mut deleted = 0u64;
        deleted += self.cleanup_one(&self.raw, now_ms, Some(minute_cursor.last_processed_ts))?;
        deleted += self.cleanup_one(&self.minute, now_ms, Some(hour_cursor.last_processed_ts))?;
        deleted += self.cleanup_one(&self.hour, now_ms, None)?;
        for target in &self.extra {
            deleted += self.cleanup_one(target, now_ms, None)?;
        }

        let total = self.total_deleted.fetch_add(deleted, Ordering::Relaxed) + deleted;
        if deleted > 0 {
            info!(deleted, total, "cleanup pass complete");
        }
        if total >= self.cfg.vacuum_threshold && deleted > 0 {
            self.total_deleted.store(0, Ordering::Relaxed);
            info!("vacuum threshold reached, requesting store maintenance");
        }
        Ok(())
    }

    /// `not_before` is the aggregation cursor guarding this tier: a row
    /// newer than it hasn't been rolled up into the next granularity yet,
    /// so it is never eligible for deletion regardless of its own age.
    fn cleanup_one(&self, target: &CleanupTarget, now_ms: i64, not_before: Option<i64>) -> Result<u64, RetentionError> {
        let age_cutoff = now_ms - (target.retention_days as i64) * MS_PER_DAY;
        let cutoff = match not_before {
            Some(guard) => age_cutoff.min(guard),
            None => age_cutoff,
        };
        let result = target.store.delete_before(cutoff);
        if !result.success {
            return Err(RetentionError::Operation(result.error_message.unwrap_or_default()));
        }
        let deleted = result.value.unwrap_or(0);
        if deleted > 0 {
            info!(target = target.name, deleted, cutoff, "cleanup deleted rows");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TelemetryStore;
    use crate::types::{TelemetryPoint, Value};

    fn cfg() -> DataCleanupConfig {
        DataCleanupConfig {
            telemetry_retention_days: 7,
            telemetry_1m_retention_days: 30,
            telemetry_1h_retention_days: 365,
            alarm_retention_days: 365,
            audit_log_retention_days: 365,
            cleanup_interval_hours: 24,
            aggregation_interval_secs: 60,
            minute_bucket_ms: 60_000,
            hour_bucket_ms: 3_600_000,
            vacuum_threshold: 10_000,
        }
    }

    #[test]
    fn guard_prevents_deleting_unaggregated_raw_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = TelemetryStore::open(dir.path()).unwrap();
        store.append_batch(&[TelemetryPoint {
            device_id: 1,
            tag_id: 1,
            ts: 1_000,
            seq: 0,
            value: Value::F64(1.0),
            quality: 192,
            protocol: "sim".into(),
            source: "test".into(),
        }]);
        let aggregation = AggregationWorker::new(store.clone()).unwrap();
        // Cursor never advanced: minute_cursor.last_processed_ts == i64::MIN,
        // so even a cutoff far in the future must not delete this row.
        let raw = CleanupTarget { name: "telemetry", store: Arc::new(store.clone()), retention_days: 0 };
        let minute_db = aggregation.minute_cursor().unwrap();
        assert_eq!(minute_db.last_processed_ts, i64::MIN);

        let worker = CleanupWorker::new(
            aggregation,
            raw,
            CleanupTarget { name: "telemetry_1m", store: Arc::new(store.clone()), retention_days: 30 },
            CleanupTarget { name: "telemetry_1h", store: Arc::new(store.clone()), retention_days: 365 },
            Vec::new(),
            cfg(),
        );
        worker.run_once(10_000_000_000).unwrap();

        let stats = store.get_stats().value.unwrap();
        assert_eq!(stats.point_count, 1);
    }
}
