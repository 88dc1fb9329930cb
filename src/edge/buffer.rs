//! Rolling file buffer for store-and-forward spill, ground: the teacher's
//! `fleet/queue.rs` idempotent-by-id disk queue, generalized from single
//! `FleetEvent`s to batches of `TelemetryPoint`s and given an explicit
//! size/age eviction policy per §4.2.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use crate::error::QueueError;
use crate::types::TelemetryPoint;

/// A spilled batch read back from disk, with the id needed to acknowledge it.
pub struct SpilledBatch {
    pub id: String,
    pub points: Vec<TelemetryPoint>,
}

/// Append-only, segmented-by-file rolling buffer. Each batch is one file;
/// filenames are zero-padded `{millis}_{counter}` so directory listing order
/// equals chronological order, which is what lets replay preserve ordering
/// across a restart.
pub struct RollingBuffer {
    dir: PathBuf,
    max_bytes: u64,
    retention: Duration,
    counter: AtomicU64,
}

impl RollingBuffer {
    pub fn open(dir: impl AsRef<Path>, max_size_mb: u64, retention_days: u64) -> Result<Self, QueueError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            max_bytes: max_size_mb * 1024 * 1024,
            retention: Duration::from_secs(retention_days * 86_400),
            counter: AtomicU64::new(0),
        })
    }

    fn batch_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    /// Spill a batch to disk under a fresh id, then evict oldest files until
    /// the directory is back under `max_bytes`.
    pub fn spill(&self, points: &[TelemetryPoint], now_ms: i64) -> Result<String, QueueError> {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let id = format!("{now_ms:020}_{seq:010}");
        self.enqueue(&id, points)?;
        self.evict_over_budget()?;
        Ok(id)
    }

    /// Idempotent re-enqueue by id — re-spilling a batch whose file already
    /// exists is a no-op, mirroring the fleet upload queue's behavior.
    pub fn enqueue(&self, id: &str, points: &[TelemetryPoint]) -> Result<(), QueueError> {
        let path = self.batch_path(id);
        if path.exists() {
            debug!(id, "batch already spilled, skipping");
            return Ok(());
        }
        let json = serde_json::to_vec(points)?;
        fs::write(&path, &json)?;
        Ok(())
    }

    /// Read the oldest pending batch (by filename order) without removing
    /// it. Returns `None` when the buffer is empty.
    pub fn oldest_pending(&self) -> Result<Option<SpilledBatch>, QueueError> {
        let mut names = self.list_batch_ids()?;
        names.sort();
        let Some(id) = names.into_iter().next() else {
            return Ok(None);
        };
        let data = fs::read(self.batch_path(&id))?;
        let points: Vec<TelemetryPoint> = serde_json::from_slice(&data)?;
        Ok(Some(SpilledBatch { id, points }))
    }

    /// Delete a batch's file after its contents have been durably sent.
    pub fn acknowledge(&self, id: &str) -> Result<(), QueueError> {
        let path = self.batch_path(id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn pending_count(&self) -> Result<usize, QueueError> {
        Ok(self.list_batch_ids()?.len())
    }

    pub fn stored_bytes(&self) -> u64 {
        fs::read_dir(&self.dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter_map(|e| e.metadata().ok())
                    .map(|m| m.len())
                    .sum()
            })
            .unwrap_or(0)
    }

    /// Evict the oldest files until the directory is under `max_bytes`.
    fn evict_over_budget(&self) -> Result<(), QueueError> {
        if self.stored_bytes() <= self.max_bytes {
            return Ok(());
        }
        let mut names = self.list_batch_ids()?;
        names.sort();
        for id in names {
            if self.stored_bytes() <= self.max_bytes {
                break;
            }
            warn!(id, "rolling buffer over budget, evicting oldest batch");
            self.acknowledge(&id)?;
        }
        Ok(())
    }

    /// Drop batches older than `retention_days`, regardless of size budget.
    pub fn prune_expired(&self) -> Result<usize, QueueError> {
        let cutoff = SystemTime::now()
            .checked_sub(self.retention)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut pruned = 0;
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let modified = entry.metadata().and_then(|m| m.modified()).unwrap_or(SystemTime::now());
            if modified < cutoff {
                fs::remove_file(entry.path())?;
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    fn list_batch_ids(&self) -> Result<Vec<String>, QueueError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;

    fn point(v: f64) -> TelemetryPoint {
        TelemetryPoint {
            device_id: 1,
            tag_id: 1,
            ts: 0,
            seq: 0,
            value: Value::F64(v),
            quality: 192,
            protocol: "opcua".into(),
            source: "edge-1".into(),
        }
    }

    #[test]
    fn spill_and_replay_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let buf = RollingBuffer::open(dir.path(), 500, 7).unwrap();
        let id1 = buf.spill(&[point(1.0)], 1000).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let _id2 = buf.spill(&[point(2.0)], 2000).unwrap();

        let first = buf.oldest_pending().unwrap().unwrap();
        assert_eq!(first.id, id1);
        assert_eq!(first.points[0].value.as_f64(), Some(1.0));

        buf.acknowledge(&first.id).unwrap();
        let second = buf.oldest_pending().unwrap().unwrap();
        assert_eq!(second.points[0].value.as_f64(), Some(2.0));
    }

    #[test]
    fn re_spilling_same_id_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let buf = RollingBuffer::open(dir.path(), 500, 7).unwrap();
        buf.enqueue("batch-1", &[point(1.0)]).unwrap();
        buf.enqueue("batch-1", &[point(999.0)]).unwrap();
        let first = buf.oldest_pending().unwrap().unwrap();
        assert_eq!(first.points[0].value.as_f64(), Some(1.0));
    }

    #[test]
    fn pending_count_reflects_acknowledgement() {
        let dir = tempfile::tempdir().unwrap();
        let buf = RollingBuffer::open(dir.path(), 500, 7).unwrap();
        buf.spill(&[point(1.0)], 1000).unwrap();
        assert_eq!(buf.pending_count().unwrap(), 1);
        let batch = buf.oldest_pending().unwrap().unwrap();
        buf.acknowledge(&batch.id).unwrap();
        assert_eq!(buf.pending_count().unwrap(), 0);
    }
}
