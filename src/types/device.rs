//! Configuration entities: devices, tags, and the revision counter used to
//! detect configuration changes across the whole system.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int,
    Float,
    String,
}

/// An asset producing tags. `edge_id` groups devices physically under one
/// edge node (a PLC, a gateway).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub device_id: u64,
    pub edge_id: u64,
    pub name: String,
    pub enabled: bool,
    pub updated_utc: i64,
}

/// A named measurement point on a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub tag_id: u64,
    pub device_id: u64,
    pub name: String,
    pub data_type: DataType,
    pub enabled: bool,
    pub updated_utc: i64,
}

/// A monotonically increasing counter over configuration entities (the max
/// of their `updated_utc`). Subsystems compare their cached revision against
/// this to detect that rules/tags/modes changed and need a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Revision(pub i64);

impl Revision {
    pub fn bump(entities: impl IntoIterator<Item = i64>) -> Self {
        Revision(entities.into_iter().max().unwrap_or(0))
    }

    pub fn has_changed_since(&self, last_seen: Revision) -> bool {
        *self > last_seen
    }
}
