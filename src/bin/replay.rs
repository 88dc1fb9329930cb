//! Replays a recorded batch of telemetry points from a file through the
//! pipeline at accelerated speed (§4.13), analogous to the teacher's
//! `volve_replay.rs`. Useful for baseline-learning backfill and regression
//! testing against a fixed recording instead of live sources.
//!
//! Input format: a JSON array of `TelemetryPoint` (the same wire shape
//! `POST /api/telemetry/batch` accepts), sorted by `(ts, seq)`.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use intellimaint_core::config::{self, PlantConfig};
use intellimaint_core::edge::{Preprocessor, RollingBuffer, StoreForwardLink};
use intellimaint_core::store::TelemetryStore;
use intellimaint_core::types::TelemetryPoint;

#[derive(Parser, Debug)]
#[command(name = "intellimaint-replay")]
#[command(about = "Replay a recorded telemetry batch through the pipeline")]
struct Args {
    /// Path to a JSON file containing an array of TelemetryPoint.
    file: String,

    /// Time compression factor relative to the recording's own timestamps.
    #[arg(long, default_value = "1000")]
    speed: f64,

    /// Points per flush batch.
    #[arg(long, default_value = "500")]
    batch_size: usize,

    /// Directory for the embedded telemetry store.
    #[arg(long, default_value = "./data/telemetry")]
    data_dir: String,

    /// Directory for the store-and-forward rolling spill buffer.
    #[arg(long, default_value = "./data/sf-buffer")]
    buffer_dir: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    config::init(PlantConfig::load());
    let cfg = config::get();

    let text = std::fs::read_to_string(&args.file)?;
    let mut points: Vec<TelemetryPoint> = serde_json::from_str(&text)?;
    points.sort_by_key(|p| (p.ts, p.seq));

    if points.is_empty() {
        tracing::warn!(file = %args.file, "replay: no points to replay");
        return Ok(());
    }

    let store = TelemetryStore::open(&args.data_dir)?;
    let preprocessor = Arc::new(Preprocessor::new());
    let buffer = Arc::new(RollingBuffer::open(
        &args.buffer_dir,
        cfg.store_forward.max_store_size_mb,
        cfg.store_forward.retention_days,
    )?);
    let link = StoreForwardLink::new(Arc::new(store.clone()), buffer, preprocessor);

    let sender = tokio::spawn(link.clone().run_sender());
    let monitor = tokio::spawn(link.clone().run_monitor());

    let mut total_sent = 0u64;
    let mut prev_ts = points[0].ts;

    for chunk in points.chunks(args.batch_size) {
        let chunk_start_ts = chunk[0].ts;
        let gap_ms = (chunk_start_ts - prev_ts).max(0) as f64 / args.speed.max(0.001);
        if gap_ms > 0.0 {
            tokio::time::sleep(Duration::from_millis(gap_ms as u64)).await;
        }
        prev_ts = chunk.last().expect("chunk is non-empty").ts;

        let now_ms = chrono::Utc::now().timestamp_millis();
        if let Err(e) = link.send(chunk.to_vec(), now_ms).await {
            tracing::error!(error = %e, "replay: send failed, aborting");
            break;
        }
        total_sent += chunk.len() as u64;
    }

    tracing::info!(total_sent, "replay: finished feeding recorded points, draining");
    link.cancellation_token().cancel();
    let _ = sender.await;
    let _ = monitor.await;
    store.flush()?;
    Ok(())
}
