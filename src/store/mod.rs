//! The embedded telemetry data store.
//!
//! Ground: the teacher's `storage/history.rs` (`sled`-backed append/range/
//! cleanup) generalized from single-stream drilling reports to a composite
//! `(device_id, tag_id, ts, seq)` key space so one tree serves both keyset
//! pagination and aggregation bucketing.

mod deletable;
pub(crate) mod keys;
mod telemetry_store;

pub use deletable::{delete_before_tree, Deletable};
pub use telemetry_store::{StorageStats, TelemetryStore};
