//! Keyset pagination: `PageToken`, `HistoryQuery`, `PagedResult` (§3, §4.1).

use serde::{Deserialize, Serialize};

use super::value::PointKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDir {
    Asc,
    Desc,
}

/// Cursor over the last row of the previous page: `(last_ts, last_seq)`.
/// Wire form is `"{lastTs}_{lastSeq}"` (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageToken {
    pub last_ts: i64,
    pub last_seq: u64,
}

impl PageToken {
    pub fn from_key(key: PointKey) -> Self {
        Self {
            last_ts: key.ts,
            last_seq: key.seq,
        }
    }

    pub fn format(&self) -> String {
        format!("{}_{}", self.last_ts, self.last_seq)
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (ts_str, seq_str) = s.split_once('_')?;
        Some(Self {
            last_ts: ts_str.parse().ok()?,
            last_seq: seq_str.parse().ok()?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pub device_id: u64,
    pub tag_id: Option<u64>,
    pub start_ts: i64,
    pub end_ts: i64,
    pub sort: SortDir,
    pub limit: usize,
    pub after: Option<PageToken>,
}

#[derive(Debug, Clone)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub next_token: Option<PageToken>,
    pub has_more: bool,
    pub total_count: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunc {
    Avg,
    Min,
    Max,
    Sum,
    Count,
    First,
    Last,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AggregateBucket {
    pub bucket_ts: i64,
    pub value: f64,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_token_round_trips() {
        let t = PageToken { last_ts: 151, last_seq: 0 };
        let s = t.format();
        assert_eq!(s, "151_0");
        assert_eq!(PageToken::parse(&s), Some(t));
    }

    #[test]
    fn page_token_rejects_garbage() {
        assert!(PageToken::parse("not-a-token").is_none());
        assert!(PageToken::parse("123").is_none());
    }
}
