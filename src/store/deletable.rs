//! Uniform delete-before capability (§4.9, design note §9): every
//! retention-capable store implements this trait directly rather than the
//! retention worker probing for a `delete_before` method by reflection.

use crate::error::{OperationResult, StoreError};

use super::TelemetryStore;

pub trait Deletable {
    /// Delete every row older than `cutoff` (exclusive upper bound on
    /// retained data: rows with `ts < cutoff` are removed). Returns the
    /// count deleted.
    fn delete_before(&self, cutoff: i64) -> OperationResult<u64>;
}

impl Deletable for TelemetryStore {
    fn delete_before(&self, cutoff: i64) -> OperationResult<u64> {
        TelemetryStore::delete_before(self, cutoff)
    }
}

/// Helper so implementors built on a raw `sled::Tree` keyed the same way the
/// telemetry store is (`store::keys` encoding) can share the scan-then-
/// delete routine instead of reimplementing it.
pub fn delete_before_tree(tree: &sled::Tree, cutoff: i64) -> Result<u64, StoreError> {
    use super::keys;

    let mut to_delete = Vec::new();
    for kv in tree.iter() {
        let (key, _) = kv?;
        let (_, _, ts, _) = keys::decode(&key);
        if ts < cutoff {
            to_delete.push(key);
        }
    }
    let mut deleted = 0u64;
    for key in &to_delete {
        tree.remove(key)?;
        deleted += 1;
    }
    if deleted > 0 {
        tree.flush()?;
    }
    Ok(deleted)
}
