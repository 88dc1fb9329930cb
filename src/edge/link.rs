//! Store-and-forward link: a bounded channel with blocking backpressure,
//! a sender loop that batches and transmits, a monitor loop that tracks
//! liveness, and the rolling file buffer spill/replay path for outages.
//!
//! Cancellation follows the teacher's `pipeline/processing_loop.rs` idiom —
//! cooperative, via `tokio_util::sync::CancellationToken` and `tokio::select!`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::OperationResult;
use crate::types::TelemetryPoint;

use super::buffer::RollingBuffer;
use super::preprocessor::{FilterOutcome, Preprocessor};

/// Destination the link transmits batches to. In this single-process
/// deployment that destination is the embedded telemetry store, but the
/// trait keeps the sender loop decoupled from storage so tests can inject a
/// failing sink to exercise the offline/spill path.
pub trait IngestSink: Send + Sync {
    fn send_batch(&self, points: &[TelemetryPoint]) -> OperationResult<usize>;
    fn ping(&self) -> bool;
}

impl IngestSink for crate::store::TelemetryStore {
    fn send_batch(&self, points: &[TelemetryPoint]) -> OperationResult<usize> {
        self.append_batch(points)
    }

    fn ping(&self) -> bool {
        self.get_stats().is_ok()
    }
}

/// Online/offline state, transitioned by the monitor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Online,
    Offline,
}

#[derive(Debug, Default)]
pub struct LinkCounters {
    pub pending_points: AtomicU64,
    pub sent_count: AtomicU64,
}

/// The store-and-forward link. Owns the bounded channel producers push onto
/// and the rolling buffer batches spill to when the sink is unavailable.
pub struct StoreForwardLink {
    sink: Arc<dyn IngestSink>,
    buffer: Arc<RollingBuffer>,
    preprocessor: Arc<Preprocessor>,
    tx: mpsc::Sender<Vec<TelemetryPoint>>,
    rx: tokio::sync::Mutex<Option<mpsc::Receiver<Vec<TelemetryPoint>>>>,
    online: AtomicBool,
    pub counters: LinkCounters,
    cancel: CancellationToken,
}

impl StoreForwardLink {
    pub fn new(sink: Arc<dyn IngestSink>, buffer: Arc<RollingBuffer>, preprocessor: Arc<Preprocessor>) -> Arc<Self> {
        let cfg = crate::config::get();
        let (tx, rx) = mpsc::channel(cfg.network.channel_capacity_batches);
        Arc::new(Self {
            sink,
            buffer,
            preprocessor,
            tx,
            rx: tokio::sync::Mutex::new(Some(rx)),
            online: AtomicBool::new(true),
            counters: LinkCounters::default(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> LinkState {
        if self.is_online() {
            LinkState::Online
        } else {
            LinkState::Offline
        }
    }

    /// Preprocess and enqueue a raw batch of points. Blocks (via the bounded
    /// channel's backpressure) rather than dropping when the channel is
    /// full; returns `Err` only on cancellation.
    pub async fn send(&self, points: Vec<TelemetryPoint>, now_ms: i64) -> Result<(), SendError> {
        let mut emitted = Vec::with_capacity(points.len());
        for point in points {
            match self.preprocessor.filter(point, now_ms) {
                FilterOutcome::Emit(p) => emitted.push(p),
                FilterOutcome::Suppressed | FilterOutcome::Dropped => {}
            }
        }
        if emitted.is_empty() {
            return Ok(());
        }

        self.counters.pending_points.fetch_add(emitted.len() as u64, Ordering::Relaxed);

        tokio::select! {
            _ = self.cancel.cancelled() => Err(SendError::Cancelled),
            res = self.tx.send(emitted) => res.map_err(|_| SendError::Closed),
        }
    }

    /// The sender loop: accumulates a batch up to `send_batch_size` or
    /// `send_interval_ms`, transmits it, and spills to the rolling buffer on
    /// failure. Runs until cancelled or the channel closes.
    pub async fn run_sender(self: Arc<Self>) {
        let cfg = crate::config::get();
        let mut rx = self.rx.lock().await.take().expect("run_sender called twice");
        let mut batch: Vec<TelemetryPoint> = Vec::new();
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(cfg.network.send_interval_ms));

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    if !batch.is_empty() {
                        self.transmit_or_spill(&batch).await;
                    }
                    break;
                }
                maybe = rx.recv() => {
                    match maybe {
                        Some(mut points) => {
                            self.counters.pending_points.fetch_sub(points.len() as u64, Ordering::Relaxed);
                            batch.append(&mut points);
                            if batch.len() >= cfg.network.send_batch_size {
                                self.transmit_or_spill(&batch).await;
                                batch.clear();
                            }
                        }
                        None => {
                            if !batch.is_empty() {
                                self.transmit_or_spill(&batch).await;
                            }
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        self.transmit_or_spill(&batch).await;
                        batch.clear();
                    }
                }
            }
        }
    }

    async fn transmit_or_spill(&self, batch: &[TelemetryPoint]) {
        if self.is_online() {
            let result = self.sink.send_batch(batch);
            if result.is_ok() {
                self.counters.sent_count.fetch_add(batch.len() as u64, Ordering::Relaxed);
                return;
            }
            warn!(error = ?result.error_message, "send failed, spilling to rolling buffer");
        }
        let now_ms = chrono::Utc::now().timestamp_millis();
        match self.buffer.spill(batch, now_ms) {
            Ok(id) => info!(id, count = batch.len(), "batch spilled to rolling buffer"),
            Err(e) => warn!(error = %e, "failed to spill batch — points dropped"),
        }
    }

    /// The monitor loop: pings the sink on a fixed interval, transitioning
    /// Online→Offline after `offline_threshold` consecutive failures and
    /// Offline→Online on the first subsequent success, draining the rolling
    /// buffer before resuming live traffic.
    pub async fn run_monitor(self: Arc<Self>) {
        let cfg = crate::config::get();
        let mut consecutive_failures = 0u32;
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(cfg.network.health_check_interval_ms));

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {
                    let healthy = tokio::time::timeout(
                        std::time::Duration::from_millis(cfg.network.health_check_timeout_ms),
                        async { self.sink.ping() },
                    )
                    .await
                    .unwrap_or(false);

                    if healthy {
                        let was_offline = !self.online.swap(true, Ordering::Relaxed);
                        consecutive_failures = 0;
                        if was_offline {
                            info!("link back online, draining rolling buffer");
                            self.drain_buffer().await;
                        }
                    } else {
                        consecutive_failures += 1;
                        if consecutive_failures >= cfg.network.offline_threshold {
                            if self.online.swap(false, Ordering::Relaxed) {
                                warn!(consecutive_failures, "link declared offline");
                            }
                        }
                    }
                }
            }
        }
    }

    /// Replay the rolling buffer oldest-first, stopping at the first
    /// failure (retried on the next drain trigger).
    async fn drain_buffer(&self) {
        loop {
            let batch = match self.buffer.oldest_pending() {
                Ok(Some(b)) => b,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "failed to read rolling buffer");
                    break;
                }
            };
            let result = self.sink.send_batch(&batch.points);
            if result.is_ok() {
                self.counters.sent_count.fetch_add(batch.points.len() as u64, Ordering::Relaxed);
                if let Err(e) = self.buffer.acknowledge(&batch.id) {
                    warn!(error = %e, id = batch.id, "failed to acknowledge replayed batch");
                    break;
                }
            } else {
                warn!(id = batch.id, "replay send failed, will retry next drain");
                break;
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("send cancelled")]
    Cancelled,
    #[error("link channel closed")]
    Closed,
}
