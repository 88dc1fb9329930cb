//! Synthetic multi-device telemetry generator (§4.13), analogous to the
//! teacher's `simulation.rs`: emits `TelemetryPoint`s for a handful of
//! simulated devices/tags at a configurable rate, feeding them through the
//! edge preprocessor and store-and-forward link so the rest of the pipeline
//! can be exercised locally without real PLC/OPC sources.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use intellimaint_core::config::{self, PlantConfig};
use intellimaint_core::edge::{Preprocessor, RollingBuffer, StoreForwardLink};
use intellimaint_core::store::TelemetryStore;
use intellimaint_core::types::{TelemetryPoint, Value, QUALITY_GOOD};

#[derive(Parser, Debug)]
#[command(name = "intellimaint-simulate")]
#[command(about = "Synthetic telemetry generator for local pipeline testing")]
struct Args {
    /// Simulated duration in minutes.
    #[arg(long, default_value = "10")]
    minutes: u32,

    /// Time compression factor: 1 = real-time, 100 = 100x faster.
    #[arg(long, default_value = "10")]
    speed: f64,

    /// Number of simulated devices.
    #[arg(long, default_value = "3")]
    devices: u64,

    /// Sample interval in milliseconds, per device/tag, at 1x speed.
    #[arg(long, default_value = "1000")]
    interval_ms: u64,

    /// Directory for the embedded telemetry store.
    #[arg(long, default_value = "./data/telemetry")]
    data_dir: String,

    /// Directory for the store-and-forward rolling spill buffer.
    #[arg(long, default_value = "./data/sf-buffer")]
    buffer_dir: String,
}

/// Tags emitted per simulated device: a motor current and a temperature,
/// each with its own baseline and noise.
const TAG_CURRENT: u64 = 1;
const TAG_TEMPERATURE: u64 = 2;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    config::init(PlantConfig::load());
    let cfg = config::get();

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

    let real_interval = Duration::from_millis((args.interval_ms as f64 / args.speed.max(0.001)) as u64);
    let total_ticks = (args.minutes as u64 * 60_000) / args.interval_ms;

    let mut rng = rand::thread_rng();
    let current_dist = Normal::new(45.0, 3.0).expect("valid normal distribution");
    let temp_dist = Normal::new(60.0, 2.0).expect("valid normal distribution");
    let mut seq: u64 = 0;
    let sim_start = chrono::Utc::now().timestamp_millis();

    for tick in 0..total_ticks {
        let ts = sim_start + (tick * args.interval_ms) as i64;
        let mut batch = Vec::with_capacity(args.devices as usize * 2);

        for device_id in 1..=args.devices {
            seq += 1;
            batch.push(point(device_id, TAG_CURRENT, ts, seq, current_dist.sample(&mut rng)));
            seq += 1;
            batch.push(point(device_id, TAG_TEMPERATURE, ts, seq, temp_dist.sample(&mut rng)));
        }

        let now_ms = chrono::Utc::now().timestamp_millis();
        if let Err(e) = link.send(batch, now_ms).await {
            tracing::warn!(error = %e, "simulate: send failed");
            break;
        }

        if tick % 100 == 0 {
            tracing::info!(tick, total_ticks, "simulate: progress");
        }
        tokio::time::sleep(real_interval).await;
    }

    tracing::info!("simulate: generation complete, draining sender");
    link.cancellation_token().cancel();
    let _ = sender.await;
    let _ = monitor.await;
    store.flush()?;
    Ok(())
}

fn point(device_id: u64, tag_id: u64, ts: i64, seq: u64, value: f64) -> TelemetryPoint {
    TelemetryPoint {
        device_id,
        tag_id,
        ts,
        seq,
        value: Value::F64(value),
        quality: QUALITY_GOOD,
        protocol: "simulated".to_string(),
        source: "simulate-bin".to_string(),
    }
}
