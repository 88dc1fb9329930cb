//! System health monitoring (§4.12, ambient): a `HealthCheck` trait
//! implemented per subsystem, polled on a fixed interval by a
//! `SystemHealthMonitor` that aggregates to a worst-of-all `SystemHealth`.
//!
//! Ground: the teacher's `background/self_healer.rs` `SelfHealer` loop
//! (check -> heal -> log), generalized beyond its original WITS/LLM/disk
//! checks to the store-and-forward link, the telemetry store, and the
//! config loader.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::edge::{LinkState, StoreForwardLink};
use crate::store::TelemetryStore;

/// Health status of a single monitored component.
#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    Healthy,
    Degraded { reason: String },
    Unhealthy { reason: String },
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "HEALTHY"),
            Self::Degraded { reason } => write!(f, "DEGRADED: {reason}"),
            Self::Unhealthy { reason } => write!(f, "UNHEALTHY: {reason}"),
        }
    }
}

/// Action taken (or not) in response to an unhealthy check.
#[derive(Debug, Clone)]
pub enum HealAction {
    Recovered,
    FallbackActivated,
    NoActionNeeded,
    ManualInterventionRequired { reason: String },
}

impl std::fmt::Display for HealAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recovered => write!(f, "recovered"),
            Self::FallbackActivated => write!(f, "fallback activated"),
            Self::NoActionNeeded => write!(f, "no action needed"),
            Self::ManualInterventionRequired { reason } => {
                write!(f, "manual intervention required: {reason}")
            }
        }
    }
}

/// Implemented by anything the monitor should poll. `heal()` is best-effort:
/// most checks here can only detect and log, since recovery (channel drain,
/// reconnect) is owned by the subsystem's own worker loop.
pub trait HealthCheck: Send + Sync {
    fn component_name(&self) -> &str;
    fn check(&self) -> HealthStatus;
    fn heal(&self) -> HealAction;
}

#[derive(Debug, Clone)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub last_checked: Instant,
    pub last_action: Option<HealAction>,
}

#[derive(Debug, Clone)]
pub struct SystemHealth {
    pub components: Vec<ComponentHealth>,
    pub overall: HealthStatus,
    pub check_cycles: u64,
}

impl SystemHealth {
    fn new() -> Self {
        Self {
            components: Vec::new(),
            overall: HealthStatus::Healthy,
            check_cycles: 0,
        }
    }
}

/// Health check for the store-and-forward link: unhealthy when offline,
/// degraded when the spill buffer is accumulating but the link is still
/// online (replay falling behind live ingestion).
pub struct LinkHealthCheck {
    link: Arc<StoreForwardLink>,
    degraded_pending_threshold: u64,
}

impl LinkHealthCheck {
    pub fn new(link: Arc<StoreForwardLink>, degraded_pending_threshold: u64) -> Self {
        Self {
            link,
            degraded_pending_threshold,
        }
    }
}

impl HealthCheck for LinkHealthCheck {
    fn component_name(&self) -> &str {
        "store-and-forward link"
    }

    fn check(&self) -> HealthStatus {
        let pending = self
            .link
            .counters
            .pending_points
            .load(std::sync::atomic::Ordering::Relaxed);
        match self.link.state() {
            LinkState::Offline => HealthStatus::Unhealthy {
                reason: format!("offline, {pending} points pending"),
            },
            LinkState::Online if pending >= self.degraded_pending_threshold => HealthStatus::Degraded {
                reason: format!("{pending} points pending replay"),
            },
            LinkState::Online => HealthStatus::Healthy,
        }
    }

    fn heal(&self) -> HealAction {
        warn!("store-and-forward link unhealthy — recovery owned by its monitor loop");
        HealAction::ManualInterventionRequired {
            reason: "link reconnect is handled by StoreForwardLink's own monitor loop".to_string(),
        }
    }
}

/// Health check for the embedded telemetry store: unhealthy when a stats
/// call fails outright, degraded above the §4.1 slow-latency threshold.
pub struct StoreHealthCheck {
    store: TelemetryStore,
}

impl StoreHealthCheck {
    pub fn new(store: TelemetryStore) -> Self {
        Self { store }
    }
}

impl HealthCheck for StoreHealthCheck {
    fn component_name(&self) -> &str {
        "telemetry store"
    }

    fn check(&self) -> HealthStatus {
        let start = Instant::now();
        let result = self.store.get_stats();
        let elapsed = start.elapsed();
        if !result.is_ok() {
            return HealthStatus::Unhealthy {
                reason: result
                    .error_message
                    .unwrap_or_else(|| "stats query failed".to_string()),
            };
        }
        let slow = Duration::from_millis(crate::config::defaults::DB_SLOW_LATENCY_MS);
        if elapsed > slow {
            HealthStatus::Degraded {
                reason: format!("stats query took {}ms", elapsed.as_millis()),
            }
        } else {
            HealthStatus::Healthy
        }
    }

    fn heal(&self) -> HealAction {
        HealAction::NoActionNeeded
    }
}

/// Health check for the config loader: degraded if the file watcher has
/// never successfully reloaded after a detected edit.
pub struct ConfigHealthCheck;

impl HealthCheck for ConfigHealthCheck {
    fn component_name(&self) -> &str {
        "plant configuration"
    }

    fn check(&self) -> HealthStatus {
        if crate::config::is_initialized() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy {
                reason: "config::init() has not been called".to_string(),
            }
        }
    }

    fn heal(&self) -> HealAction {
        HealAction::ManualInterventionRequired {
            reason: "missing config init is a startup bug, not auto-recoverable".to_string(),
        }
    }
}

/// Polls every registered `HealthCheck` on a fixed interval and aggregates
/// to a worst-of-all `SystemHealth`, exposed for external polling via
/// `health_handle()`.
pub struct SystemHealthMonitor {
    checks: Vec<Box<dyn HealthCheck>>,
    health: Arc<RwLock<SystemHealth>>,
    interval: Duration,
}

impl SystemHealthMonitor {
    pub fn new(checks: Vec<Box<dyn HealthCheck>>, interval: Duration) -> Self {
        Self {
            checks,
            health: Arc::new(RwLock::new(SystemHealth::new())),
            interval,
        }
    }

    pub fn health_handle(&self) -> Arc<RwLock<SystemHealth>> {
        self.health.clone()
    }

    /// Runs until `cancel` fires. Intended to be spawned as one cooperating
    /// task alongside the rest of the pipeline (§5: cooperative cancellation).
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            checks = self.checks.len(),
            interval_secs = self.interval.as_secs(),
            "system health monitor started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("system health monitor shutting down");
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {
                    self.run_cycle().await;
                }
            }
        }
    }

    async fn run_cycle(&self) {
        let mut components = Vec::with_capacity(self.checks.len());
        let mut worst = HealthStatus::Healthy;

        for check in &self.checks {
            let status = check.check();
            let action = match &status {
                HealthStatus::Unhealthy { .. } => {
                    error!(component = check.component_name(), status = %status, "component unhealthy");
                    Some(check.heal())
                }
                HealthStatus::Degraded { .. } => {
                    warn!(component = check.component_name(), status = %status, "component degraded");
                    None
                }
                HealthStatus::Healthy => {
                    debug!(component = check.component_name(), "component healthy");
                    None
                }
            };

            if let Some(ref action) = action {
                info!(component = check.component_name(), action = %action, "heal action taken");
            }

            worst = worse_of(worst, status.clone());
            components.push(ComponentHealth {
                name: check.component_name().to_string(),
                status,
                last_checked: Instant::now(),
                last_action: action,
            });
        }

        let mut health = self.health.write().await;
        health.components = components;
        health.overall = worst;
        health.check_cycles += 1;
    }
}

fn worse_of(a: HealthStatus, b: HealthStatus) -> HealthStatus {
    match (&a, &b) {
        (HealthStatus::Healthy, _) => b,
        (HealthStatus::Degraded { .. }, HealthStatus::Unhealthy { .. }) => b,
        _ => a,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysUnhealthy;
    impl HealthCheck for AlwaysUnhealthy {
        fn component_name(&self) -> &str {
            "always-unhealthy"
        }
        fn check(&self) -> HealthStatus {
            HealthStatus::Unhealthy {
                reason: "test".to_string(),
            }
        }
        fn heal(&self) -> HealAction {
            HealAction::ManualInterventionRequired {
                reason: "test".to_string(),
            }
        }
    }

    #[tokio::test]
    async fn cycle_aggregates_to_worst_status() {
        let monitor = SystemHealthMonitor::new(vec![Box::new(AlwaysUnhealthy)], Duration::from_secs(60));
        monitor.run_cycle().await;
        let health = monitor.health_handle().read().await.clone();
        assert_eq!(health.check_cycles, 1);
        assert!(matches!(health.overall, HealthStatus::Unhealthy { .. }));
    }

    #[test]
    fn worse_of_prefers_unhealthy_over_degraded() {
        let a = HealthStatus::Degraded {
            reason: "x".to_string(),
        };
        let b = HealthStatus::Unhealthy {
            reason: "y".to_string(),
        };
        assert!(matches!(worse_of(a, b), HealthStatus::Unhealthy { .. }));
    }
}
