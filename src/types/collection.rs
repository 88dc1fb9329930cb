//! Collection rules and the segments they produce (§3, §4.3).

use serde::{Deserialize, Serialize};

use super::condition::Condition;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Tags to record while a segment is `Collecting`.
    pub tags: Vec<u64>,
    pub pre_buffer_seconds: u64,
    pub post_buffer_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionRule {
    pub rule_id: u64,
    pub device_id: u64,
    pub start_condition: Condition,
    pub stop_condition: Condition,
    /// How long `stop_condition` must hold continuously before the segment
    /// moves to `PostBuffer` (§4.3 Collecting state).
    pub stop_duration_ms: u64,
    pub collection_config: CollectionConfig,
    pub enabled: bool,
    pub updated_utc: i64,
    pub trigger_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    Collecting,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSegment {
    pub id: u64,
    pub rule_id: u64,
    pub device_id: u64,
    pub start_ts: i64,
    pub end_ts: Option<i64>,
    pub status: SegmentStatus,
    pub data_point_count: u64,
    pub metadata: String,
}
