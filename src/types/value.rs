//! The telemetry value tagged union and the immutable `TelemetryPoint`.
//!
//! Design note: the source system represented a point as a record with one
//! optional slot per possible type plus a `value_type` discriminant. That
//! shape is kept for the JSON wire form (so external producers are
//! unaffected) but the in-process representation is a proper tagged union —
//! `IsValid` is then a property of the type, not something to check at
//! runtime.

use serde::{Deserialize, Serialize};

/// OPC-style quality code. 192 = Good.
pub const QUALITY_GOOD: i32 = 192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    String,
    ByteArray,
    DateTime,
}

/// A tagged-union telemetry value. The `ValueType` the point carries always
/// matches the variant here by construction — there is no way to build a
/// `Value::F64` and have `value_type` disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "value_type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    Bytes(Vec<u8>),
    DateTime(i64),
}

impl Value {
    pub const fn value_type(&self) -> ValueType {
        match self {
            Value::Bool(_) => ValueType::Bool,
            Value::I8(_) => ValueType::Int8,
            Value::I16(_) => ValueType::Int16,
            Value::I32(_) => ValueType::Int32,
            Value::I64(_) => ValueType::Int64,
            Value::U8(_) => ValueType::UInt8,
            Value::U16(_) => ValueType::UInt16,
            Value::U32(_) => ValueType::UInt32,
            Value::U64(_) => ValueType::UInt64,
            Value::F32(_) => ValueType::Float32,
            Value::F64(_) => ValueType::Float64,
            Value::Str(_) => ValueType::String,
            Value::Bytes(_) => ValueType::ByteArray,
            Value::DateTime(_) => ValueType::DateTime,
        }
    }

    /// Best-effort numeric projection, used by everything downstream of
    /// ingestion (deadband filtering, alarm evaluation, baselines, health
    /// scoring) that only cares about numeric tags.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
            Value::I8(v) => Some(v as f64),
            Value::I16(v) => Some(v as f64),
            Value::I32(v) => Some(v as f64),
            Value::I64(v) => Some(v as f64),
            Value::U8(v) => Some(v as f64),
            Value::U16(v) => Some(v as f64),
            Value::U32(v) => Some(v as f64),
            Value::U64(v) => Some(v as f64),
            Value::F32(v) => Some(v as f64),
            Value::F64(v) => Some(v),
            Value::DateTime(v) => Some(v as f64),
            Value::Str(_) | Value::Bytes(_) => None,
        }
    }
}

/// `(device_id, tag_id, ts, seq)` — the primary key of a telemetry point.
/// Ordering is strictly lexicographic on this tuple; it is the sort key used
/// by both keyset pagination and aggregation bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PointKey {
    pub device_id: u64,
    pub tag_id: u64,
    pub ts: i64,
    pub seq: u64,
}

/// An immutable telemetry reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    pub device_id: u64,
    pub tag_id: u64,
    /// Unix epoch milliseconds, UTC.
    pub ts: i64,
    /// Monotonic per-process counter, tiebreaker within the same millisecond.
    pub seq: u64,
    pub value: Value,
    /// OPC-style quality code; `QUALITY_GOOD` (192) for a trusted reading.
    pub quality: i32,
    pub protocol: String,
    pub source: String,
}

impl TelemetryPoint {
    pub fn key(&self) -> PointKey {
        PointKey {
            device_id: self.device_id,
            tag_id: self.tag_id,
            ts: self.ts,
            seq: self.seq,
        }
    }

    /// A tagged union is valid by construction; this still confirms quality
    /// and provenance are populated, since a non-Rust caller may have handed
    /// us the JSON wire form directly and skipped our constructors.
    pub fn is_valid(&self) -> bool {
        !self.protocol.is_empty() && !self.source.is_empty() && self.quality >= 0
    }

    pub fn value_type(&self) -> ValueType {
        self.value.value_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_type_matches_variant() {
        let v = Value::F64(1.23);
        assert_eq!(v.value_type(), ValueType::Float64);
    }

    #[test]
    fn point_is_valid_requires_provenance() {
        let p = TelemetryPoint {
            device_id: 1,
            tag_id: 2,
            ts: 1000,
            seq: 0,
            value: Value::F64(1.0),
            quality: QUALITY_GOOD,
            protocol: "opcua".into(),
            source: "edge-1".into(),
        };
        assert!(p.is_valid());

        let mut bad = p.clone();
        bad.protocol.clear();
        assert!(!bad.is_valid());
    }

    #[test]
    fn key_ordering_is_lexicographic() {
        let a = PointKey { device_id: 1, tag_id: 1, ts: 100, seq: 0 };
        let b = PointKey { device_id: 1, tag_id: 1, ts: 100, seq: 1 };
        let c = PointKey { device_id: 1, tag_id: 1, ts: 101, seq: 0 };
        assert!(a < b);
        assert!(b < c);
    }
}
