//! Edge preprocessing and store-and-forward delivery (§4.2).
//!
//! Ground: the teacher's `fleet/queue.rs` (disk-backed idempotent queue) and
//! `fleet/uploader.rs` (drain-and-send loop) for the rolling buffer and
//! sender loop; `cfc/normalizer.rs`'s Welford accumulator (via
//! [`crate::stats`]) for the outlier detector.

mod buffer;
mod link;
mod preprocessor;

pub use buffer::{RollingBuffer, SpilledBatch};
pub use link::{IngestSink, LinkCounters, LinkState, SendError, StoreForwardLink};
pub use preprocessor::{FilterCounters, FilterOutcome, Preprocessor, TagProcessingConfig, QUALITY_UNCERTAIN};
