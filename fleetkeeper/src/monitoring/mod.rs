//! Fleet Monitoring
//!
//! One task per configured fleet, all owned by [`Monitor::run`]:
//! - standalone: periodic connect/INFO/read-write checks per instance
//! - sentinel: event listeners per sentinel plus periodic PING checks
//! - cluster: periodic topology snapshot, slot coverage and PING checks
//!
//! Periodic checks sleep a random interval between the configured bounds
//! so many monitored fleets do not fire together.

pub mod health;
pub mod info;

pub use health::{
    check_cluster, check_instance, check_reachable, check_sentinel, discover_topology,
    topology_issues,
};
pub use info::InfoReport;

use crate::config::MonitorConfig;
use crate::connection::NodeConnector;
use crate::core::{ClusterFleet, FleetSpec, SentinelFleet, StandaloneFleet};
use crate::notify::{Code, Notice, Notifier};
use crate::sentinel::SentinelMonitor;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// Scheduling and timeout knobs for monitor tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub interval_min: Duration,
    pub interval_max: Duration,
    pub command_timeout: Duration,
    pub run_on_start: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval_min: Duration::from_secs(60),
            interval_max: Duration::from_secs(120),
            command_timeout: Duration::from_secs(5),
            run_on_start: true,
        }
    }
}

impl From<&MonitorConfig> for MonitorSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            interval_min: Duration::from_secs(config.monitor.interval_min_secs),
            interval_max: Duration::from_secs(config.monitor.interval_max_secs),
            command_timeout: config.timeouts.command_timeout(),
            run_on_start: config.monitor.run_on_start,
        }
    }
}

impl MonitorSettings {
    /// Uniformly drawn from `[interval_min, interval_max]`
    pub fn next_interval(&self) -> Duration {
        jittered_interval(self.interval_min, self.interval_max)
    }
}

pub fn jittered_interval(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let low = min.as_millis() as u64;
    let high = max.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(low..=high))
}

/// Remembers the last outcome per target to report recoveries
#[derive(Debug, Default)]
struct HealthTracker {
    unhealthy: HashMap<String, bool>,
}

impl HealthTracker {
    /// Returns whether `target` just went from unhealthy to healthy
    fn record(&mut self, target: &str, healthy: bool) -> bool {
        let was_unhealthy = self
            .unhealthy
            .insert(target.to_string(), !healthy)
            .unwrap_or(false);
        was_unhealthy && healthy
    }
}

#[derive(Clone)]
struct FleetContext {
    connector: Arc<dyn NodeConnector>,
    notifier: Arc<dyn Notifier>,
    settings: MonitorSettings,
}

impl FleetContext {
    /// Sleep one jittered interval; `false` once shutdown is requested
    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        if *shutdown.borrow() {
            return false;
        }
        let delay = self.settings.next_interval();
        debug!("Next check in {:?}", delay);
        let stopped = tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = shutdown.changed() => true,
        };
        !stopped && !*shutdown.borrow()
    }

    /// Forward failures, and recoveries of previously failing targets
    fn report(&self, tracker: &mut HealthTracker, target: &str, notices: Vec<Notice>) {
        let healthy = notices.iter().all(|n| !n.is_error());
        if tracker.record(target, healthy) {
            self.notifier.notify(&Notice::content(
                Code::ErrorRestore,
                Code::ErrorRestore.message(),
                format!("{} recovered", target),
            ));
        }
        for notice in notices {
            if notice.is_error() {
                self.notifier.notify(&notice);
            } else {
                debug!("{}", notice.text());
            }
        }
    }

    async fn watch_standalone(self, fleet: StandaloneFleet, mut shutdown: watch::Receiver<bool>) {
        let instances = fleet.instances();
        let mut tracker = HealthTracker::default();
        info!(
            "Monitoring standalone fleet {} ({} instances)",
            fleet.app_name,
            instances.len()
        );

        if !self.settings.run_on_start && !self.pause(&mut shutdown).await {
            return;
        }
        loop {
            for addr in &instances {
                let notice = check_instance(
                    self.connector.as_ref(),
                    addr,
                    fleet.password.as_deref(),
                    self.settings.command_timeout,
                )
                .await;
                self.report(&mut tracker, addr, vec![notice]);
            }
            if !self.pause(&mut shutdown).await {
                break;
            }
        }
    }

    async fn watch_sentinel(self, fleet: SentinelFleet, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Monitoring sentinel fleet {} ({} sentinels, masters {:?})",
            fleet.app_name,
            fleet.sentinels.len(),
            fleet.master_names
        );

        let mut listeners = JoinSet::new();
        for addr in fleet.sentinels.clone() {
            listeners.spawn(self.clone().listen_sentinel(
                addr,
                fleet.password.clone(),
                shutdown.clone(),
            ));
        }

        let mut tracker = HealthTracker::default();
        if self.settings.run_on_start || self.pause(&mut shutdown).await {
            loop {
                for addr in &fleet.sentinels {
                    let notice = check_sentinel(
                        self.connector.as_ref(),
                        addr,
                        fleet.password.as_deref(),
                        self.settings.command_timeout,
                    )
                    .await;
                    self.report(&mut tracker, addr, vec![notice]);
                }
                if !self.pause(&mut shutdown).await {
                    break;
                }
            }
        }

        while let Some(joined) = listeners.join_next().await {
            if let Err(e) = joined {
                error!("Sentinel listener task failed: {}", e);
            }
        }
    }

    /// Keep a listener attached to one sentinel, reconnecting after each loss
    async fn listen_sentinel(
        self,
        addr: String,
        password: Option<String>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let monitor = SentinelMonitor::new(
            self.connector.clone(),
            self.notifier.clone(),
            password,
            self.settings.command_timeout,
        );

        loop {
            let mut stop_rx = shutdown.clone();
            let stop = async move {
                let _ = stop_rx.changed().await;
            };
            if let Err(e) = monitor.run(&addr, stop).await {
                debug!("Sentinel {} listener ended with error: {}", addr, e);
            }
            if !self.pause(&mut shutdown).await {
                break;
            }
        }
    }

    async fn watch_cluster(self, fleet: ClusterFleet, mut shutdown: watch::Receiver<bool>) {
        let mut tracker = HealthTracker::default();
        info!(
            "Monitoring cluster fleet {} ({} seed instances)",
            fleet.app_name,
            fleet.instances.len()
        );

        if !self.settings.run_on_start && !self.pause(&mut shutdown).await {
            return;
        }
        loop {
            let notices = check_cluster(
                self.connector.as_ref(),
                &fleet,
                self.settings.command_timeout,
            )
            .await;
            let target = format!("cluster {}", fleet.app_name);
            self.report(&mut tracker, &target, notices);

            if !self.pause(&mut shutdown).await {
                break;
            }
        }
    }
}

/// Owns one monitoring task per fleet
pub struct Monitor {
    fleets: Vec<FleetSpec>,
    context: FleetContext,
}

impl Monitor {
    pub fn new(
        fleets: Vec<FleetSpec>,
        connector: Arc<dyn NodeConnector>,
        notifier: Arc<dyn Notifier>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            fleets,
            context: FleetContext {
                connector,
                notifier,
                settings,
            },
        }
    }

    /// Run every fleet task until `shutdown` flips to `true`
    ///
    /// Returns the number of tasks joined, which is always the number of fleets.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> usize {
        let mut tasks = JoinSet::new();
        for fleet in self.fleets {
            let ctx = self.context.clone();
            let rx = shutdown.clone();
            match fleet {
                FleetSpec::Standalone(f) => tasks.spawn(ctx.watch_standalone(f, rx)),
                FleetSpec::Sentinel(f) => tasks.spawn(ctx.watch_sentinel(f, rx)),
                FleetSpec::Cluster(f) => tasks.spawn(ctx.watch_cluster(f, rx)),
            };
        }

        let expected = tasks.len();
        info!("Monitor started with {} fleet tasks", expected);

        let mut joined = 0;
        while let Some(result) = tasks.join_next().await {
            joined += 1;
            if let Err(e) = result {
                error!("Fleet monitor task failed: {}", e);
            }
        }
        info!("Monitor stopped, {}/{} fleet tasks joined", joined, expected);
        joined
    }
}
