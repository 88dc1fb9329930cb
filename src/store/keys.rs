//! Byte encoding for the telemetry store's composite `(device_id, tag_id, ts,
//! seq)` key, laid out so that unsigned lexicographic comparison of the byte
//! string matches numeric ordering of the tuple. This lets `sled::Tree::range`
//! directly satisfy both aggregation bucketing and keyset pagination without
//! a secondary index.

use crate::types::PointKey;

/// Total encoded key length: 8 (device) + 8 (tag) + 8 (ts) + 8 (seq).
pub const KEY_LEN: usize = 32;

/// Encode a point key to its sortable byte representation.
///
/// `ts` is `i64` and can be negative (pre-epoch); the sign bit is flipped so
/// that two's-complement ordering matches unsigned byte ordering.
pub fn encode(device_id: u64, tag_id: u64, ts: i64, seq: u64) -> [u8; KEY_LEN] {
    let mut buf = [0u8; KEY_LEN];
    buf[0..8].copy_from_slice(&device_id.to_be_bytes());
    buf[8..16].copy_from_slice(&tag_id.to_be_bytes());
    buf[16..24].copy_from_slice(&flip_sign(ts).to_be_bytes());
    buf[24..32].copy_from_slice(&seq.to_be_bytes());
    buf
}

pub fn encode_point_key(key: &PointKey) -> [u8; KEY_LEN] {
    encode(key.device_id, key.tag_id, key.ts, key.seq)
}

/// Decode a full key back into its tuple. Panics on malformed input — keys
/// are only ever produced by `encode`, so a length mismatch means DB
/// corruption, not a recoverable condition.
pub fn decode(bytes: &[u8]) -> (u64, u64, i64, u64) {
    assert_eq!(bytes.len(), KEY_LEN, "malformed telemetry store key");
    let device_id = u64::from_be_bytes(bytes[0..8].try_into().unwrap());
    let tag_id = u64::from_be_bytes(bytes[8..16].try_into().unwrap());
    let ts = unflip_sign(u64::from_be_bytes(bytes[16..24].try_into().unwrap()));
    let seq = u64::from_be_bytes(bytes[24..32].try_into().unwrap());
    (device_id, tag_id, ts, seq)
}

/// Lower bound for a `(device_id, tag_id)` prefix scan: ts=i64::MIN, seq=0.
pub fn prefix_lower(device_id: u64, tag_id: u64) -> [u8; KEY_LEN] {
    encode(device_id, tag_id, i64::MIN, 0)
}

/// Upper bound (inclusive) for a `(device_id, tag_id)` prefix scan.
pub fn prefix_upper(device_id: u64, tag_id: u64) -> [u8; KEY_LEN] {
    encode(device_id, tag_id, i64::MAX, u64::MAX)
}

fn flip_sign(ts: i64) -> u64 {
    (ts as u64) ^ (1u64 << 63)
}

fn unflip_sign(bits: u64) -> i64 {
    (bits ^ (1u64 << 63)) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_preserves_numeric_order() {
        let a = encode(1, 1, -100, 0);
        let b = encode(1, 1, 0, 0);
        let c = encode(1, 1, 100, 0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn decode_round_trips() {
        let key = encode(7, 42, -55, 3);
        assert_eq!(decode(&key), (7, 42, -55, 3));
    }

    #[test]
    fn tag_prefix_sorts_below_next_tag() {
        let upper_tag1 = prefix_upper(1, 1);
        let lower_tag2 = prefix_lower(1, 2);
        assert!(upper_tag1 < lower_tag2);
    }
}
