//! Process entrypoint (§4.13): boots the plant configuration, the embedded
//! telemetry store, the edge preprocessor/store-and-forward link, the
//! collection rule engine, the alarm evaluator, the retention workers, and
//! the system health monitor as cooperating `tokio` tasks under one
//! `CancellationToken`, shutting down cleanly on SIGINT/SIGTERM.
//!
//! Cycle analysis, motor baseline learning, health assessment and
//! prognostics are request-driven engines (§4.5-§4.8) rather than
//! standing loops — they are invoked on demand, per device, by whatever
//! schedules a maintenance pass against this daemon's store; wiring that
//! scheduling to a concrete device/tag registry is an admin-surface concern
//! out of scope here (§1).

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use intellimaint_core::alarms::AlarmEvaluator;
use intellimaint_core::collection::CollectionEngine;
use intellimaint_core::config::{self, PlantConfig};
use intellimaint_core::edge::{Preprocessor, RollingBuffer, StoreForwardLink};
use intellimaint_core::observability::{
    ConfigHealthCheck, HealthCheck, LinkHealthCheck, StoreHealthCheck, SystemHealthMonitor,
};
use intellimaint_core::retention::{AggregationWorker, CleanupTarget, CleanupWorker, RollupStore};
use intellimaint_core::store::TelemetryStore;
use intellimaint_core::types::RollupTable;

#[derive(Parser, Debug)]
#[command(name = "intellimaint-daemon")]
#[command(about = "IntelliMaint telemetry pipeline daemon")]
struct Args {
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
        .json()
        .init();

    let args = Args::parse();
    config::init(PlantConfig::load());
    let cfg = config::get();

    let store = TelemetryStore::open(&args.data_dir)?;
    let cancel = CancellationToken::new();

    let preprocessor = Arc::new(Preprocessor::new());
    let buffer = Arc::new(RollingBuffer::open(
        &args.buffer_dir,
        cfg.store_forward.max_store_size_mb,
        cfg.store_forward.retention_days,
    )?);
    let link = StoreForwardLink::new(Arc::new(store.clone()), buffer, preprocessor);

    let collection = Arc::new(CollectionEngine::new());
    let alarms = Arc::new(AlarmEvaluator::new());

    let aggregation = AggregationWorker::new(store.clone())?;
    let minute_rollup = RollupStore::open(&store.db(), RollupTable::Telemetry1m)?;
    let hour_rollup = RollupStore::open(&store.db(), RollupTable::Telemetry1h)?;
    let cleanup = Arc::new(CleanupWorker::new(
        aggregation.clone(),
        CleanupTarget {
            name: "telemetry",
            store: Arc::new(store.clone()),
            retention_days: cfg.data_cleanup.telemetry_retention_days,
        },
        CleanupTarget {
            name: "telemetry_1m",
            store: Arc::new(minute_rollup),
            retention_days: cfg.data_cleanup.telemetry_1m_retention_days,
        },
        CleanupTarget {
            name: "telemetry_1h",
            store: Arc::new(hour_rollup),
            retention_days: cfg.data_cleanup.telemetry_1h_retention_days,
        },
        Vec::new(),
        cfg.data_cleanup.clone(),
    ));

    let checks: Vec<Box<dyn HealthCheck>> = vec![
        Box::new(LinkHealthCheck::new(link.clone(), cfg.edge.queue_capacity_global as u64 / 2)),
        Box::new(StoreHealthCheck::new(store.clone())),
        Box::new(ConfigHealthCheck),
    ];
    let monitor = SystemHealthMonitor::new(checks, Duration::from_secs(30));

    let mut tasks = tokio::task::JoinSet::new();

    tasks.spawn(link.clone().run_sender());
    tasks.spawn(link.clone().run_monitor());
    tasks.spawn(aggregation.clone().run());
    tasks.spawn(cleanup.clone().run(cancel.clone()));
    tasks.spawn(monitor.run(cancel.clone()));

    {
        let store = store.clone();
        let collection = collection.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move { run_collection_loop(collection, store, cancel).await });
    }
    {
        let store = store.clone();
        let alarms = alarms.clone();
        let cancel = cancel.clone();
        tasks.spawn(async move { run_alarm_loop(alarms, store, cancel).await });
    }

    info!("intellimaint daemon running — Ctrl-C to shut down");
    wait_for_shutdown_signal().await;
    info!("shutdown requested, draining and finalizing");

    cancel.cancel();
    link.cancellation_token().cancel();
    aggregation.cancellation_token().cancel();

    let now_ms = chrono::Utc::now().timestamp_millis();
    for event in collection.shutdown(now_ms) {
        info!(?event, "collection segment finalized on shutdown");
    }
    store.flush()?;

    while tasks.join_next().await.is_some() {}
    info!("intellimaint daemon stopped");
    Ok(())
}

/// Drives the collection rule engine's 500ms tick (§4.3).
async fn run_collection_loop(engine: Arc<CollectionEngine>, store: TelemetryStore, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(Duration::from_millis(
        intellimaint_core::config::defaults::COLLECTION_TICK_MS,
    ));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                let now_ms = chrono::Utc::now().timestamp_millis();
                for event in engine.tick(&store, now_ms) {
                    info!(?event, "collection event");
                }
            }
        }
    }
}

/// Feeds newly-ingested points to the alarm evaluator and periodically
/// checks offline-tag rules (§4.4). Polls the store rather than subscribing
/// to the ingestion path directly, keeping the evaluator store-agnostic for
/// tests.
async fn run_alarm_loop(evaluator: Arc<AlarmEvaluator>, store: TelemetryStore, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    let mut last_ts = chrono::Utc::now().timestamp_millis();
    let mut offline_check_counter: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                let now_ms = chrono::Utc::now().timestamp_millis();
                let result = store.scan_ts_range(last_ts, now_ms);
                if result.is_ok() {
                    for point in result.value.unwrap_or_default() {
                        for alarm in evaluator.on_point(&point, now_ms) {
                            warn!(alarm_id = alarm.alarm_id, code = %alarm.code, "alarm fired");
                        }
                    }
                } else {
                    warn!(error = ?result.error_message, "alarm scan failed");
                }
                last_ts = now_ms;

                offline_check_counter += 1;
                if offline_check_counter % 60 == 0 {
                    for alarm in evaluator.check_offline(&store, now_ms) {
                        warn!(alarm_id = alarm.alarm_id, "offline alarm fired");
                    }
                }
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigterm.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
