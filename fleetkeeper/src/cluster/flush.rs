//! Cluster-wide flush
//!
//! A synchronous FLUSHALL on a 3.x node blocks it for the whole flush. If
//! that lasts longer than `cluster-node-timeout`, its peers mark it failed
//! and promote a replica. Before the first 3.x node is flushed the fleet
//! timeout is raised once, and it is put back once after the node loop.
//! 4.x and later nodes get `FLUSHALL ASYNC` and need no relaxation.
//!
//! Nodes are flushed masters first, then replicas, one at a time. The first
//! failure stops the run; nodes already flushed stay flushed.

use super::fleet_config::FleetConfigManager;
use super::topology::ClusterTopology;
use crate::connection::{self, FlushMode, NodeConnection, NodeConnector};
use crate::core::{FleetError, FlushStep, Result};
use crate::monitoring::InfoReport;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Failure-detection timeout relaxed around legacy flushes
pub const NODE_TIMEOUT_KEY: &str = "cluster-node-timeout";

/// Value the timeout is raised to while legacy nodes are flushed
pub const RELAXED_NODE_TIMEOUT: &str = "1800";

/// Budget for connecting to and flushing one node
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Major version whose flush blocks the node
pub const LEGACY_MAJOR_VERSION: u32 = 3;

/// Name of the flush command, `FLUSHALL` unless renamed on the servers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushCommand(String);

impl FlushCommand {
    pub const FLUSHALL: &'static str = "FLUSHALL";

    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.trim().is_empty() {
            return Self::default();
        }
        Self(name.trim().to_string())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    pub fn is_renamed(&self) -> bool {
        !self.0.eq_ignore_ascii_case(Self::FLUSHALL)
    }
}

impl Default for FlushCommand {
    fn default() -> Self {
        Self(Self::FLUSHALL.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeFlushOutcome {
    pub addr: String,
    pub version: String,
    pub asynchronous: bool,
}

/// Result of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// `cluster-node-timeout` before the run, restored at the end
    pub original_timeout: String,
    /// Whether the timeout was relaxed for legacy nodes
    pub relaxed: bool,
    pub nodes: Vec<NodeFlushOutcome>,
}

fn step_error(addr: &str, step: FlushStep, source: FleetError) -> FleetError {
    FleetError::Orchestration {
        addr: addr.to_string(),
        step,
        source: Box::new(source),
    }
}

pub struct ClusterFlushOrchestrator {
    config: FleetConfigManager,
    connector: Arc<dyn NodeConnector>,
    password: Option<String>,
    flush_timeout: Duration,
    relaxed_timeout: String,
    run_lock: Mutex<()>,
}

impl ClusterFlushOrchestrator {
    pub fn new(connector: Arc<dyn NodeConnector>, password: Option<String>) -> Self {
        Self {
            config: FleetConfigManager::new(connector.clone(), password.clone()),
            connector,
            password,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
            relaxed_timeout: RELAXED_NODE_TIMEOUT.to_string(),
            run_lock: Mutex::new(()),
        }
    }

    /// Per-node timeout for config reads and writes
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_timeout(timeout);
        self
    }

    /// Per-node budget for connect, version detection and flush
    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    /// Value `cluster-node-timeout` is raised to while 3.x nodes are flushed
    pub fn with_relaxed_timeout(mut self, value: impl Into<String>) -> Self {
        self.relaxed_timeout = value.into();
        self
    }

    /// Flush every node of `topology`
    ///
    /// Runs through the same orchestrator are serialized.
    pub async fn flush_all(
        &self,
        topology: &ClusterTopology,
        command: &FlushCommand,
    ) -> Result<FlushReport> {
        let _guard = self.run_lock.lock().await;

        let addrs = topology.all_addresses();
        if addrs.is_empty() {
            return Err(FleetError::EmptyFleet {
                operation: command.name().to_string(),
            });
        }

        let original_timeout = self.config.get(&addrs, NODE_TIMEOUT_KEY).await?;
        info!(
            "Flushing {} nodes with {} ({} = {})",
            addrs.len(),
            command.name(),
            NODE_TIMEOUT_KEY,
            original_timeout
        );
        if command.is_renamed() {
            info!("Flush command is renamed to {}", command.name());
        }

        let mut relaxed = false;
        let mut nodes = Vec::with_capacity(addrs.len());
        let mut outcome = Ok(());
        for addr in &addrs {
            match self.flush_node(addr, &addrs, command, &mut relaxed).await {
                Ok(node) => nodes.push(node),
                Err(e) => {
                    warn!("Cluster flush stopped at {}: {}", addr, e);
                    outcome = Err(e);
                    break;
                }
            }
        }

        if relaxed {
            let mut failed = self
                .config
                .restore(&addrs, NODE_TIMEOUT_KEY, &original_timeout)
                .await
                .into_iter();
            if let Some((first_addr, first_err)) = failed.next() {
                warn!(
                    "Could not restore {} to {} on {}: {}",
                    NODE_TIMEOUT_KEY, original_timeout, first_addr, first_err
                );
                let mut unrestored = vec![first_addr.clone()];
                for (addr, e) in failed {
                    warn!(
                        "Could not restore {} to {} on {}: {}",
                        NODE_TIMEOUT_KEY, original_timeout, addr, e
                    );
                    unrestored.push(addr);
                }

                let cause = match outcome {
                    Err(e) => e,
                    Ok(()) => step_error(&first_addr, FlushStep::RestoreTimeout, first_err),
                };
                return Err(FleetError::RestoreIncomplete {
                    key: NODE_TIMEOUT_KEY.to_string(),
                    value: original_timeout,
                    unrestored,
                    cause: Box::new(cause),
                });
            }
            info!("Restored {} to {}", NODE_TIMEOUT_KEY, original_timeout);
        }

        outcome?;
        info!("Cluster flush finished on {} nodes", nodes.len());
        Ok(FlushReport {
            original_timeout,
            relaxed,
            nodes,
        })
    }

    async fn flush_node(
        &self,
        addr: &str,
        fleet: &[String],
        command: &FlushCommand,
        relaxed: &mut bool,
    ) -> Result<NodeFlushOutcome> {
        let mut conn = connection::open(
            self.connector.as_ref(),
            addr,
            self.password.as_deref(),
            self.flush_timeout,
        )
        .await
        .map_err(|e| step_error(addr, FlushStep::Connect, e))?;

        let result = self
            .flush_on(&mut *conn, addr, fleet, command, relaxed)
            .await;
        conn.close().await;
        result
    }

    async fn flush_on(
        &self,
        conn: &mut dyn NodeConnection,
        addr: &str,
        fleet: &[String],
        command: &FlushCommand,
        relaxed: &mut bool,
    ) -> Result<NodeFlushOutcome> {
        let info = connection::with_timeout(addr, "INFO", self.flush_timeout, conn.info())
            .await
            .map_err(|e| step_error(addr, FlushStep::DetectVersion, e))?;
        let report = InfoReport::parse(&info);
        let version = report.version().unwrap_or_default().to_string();
        let unsupported = || {
            step_error(
                addr,
                FlushStep::DetectVersion,
                FleetError::UnsupportedVersion {
                    addr: addr.to_string(),
                    version: version.clone(),
                },
            )
        };

        let major = report.major_version().ok_or_else(unsupported)?;
        let mode = if major == LEGACY_MAJOR_VERSION {
            if !*relaxed {
                info!(
                    "{} runs {}, raising {} to {} before flushing",
                    addr, version, NODE_TIMEOUT_KEY, self.relaxed_timeout
                );
                // Marked first so a partially applied relax is still restored
                *relaxed = true;
                self.config
                    .set(fleet, NODE_TIMEOUT_KEY, &self.relaxed_timeout)
                    .await
                    .map_err(|e| step_error(addr, FlushStep::RelaxTimeout, e))?;
            }
            FlushMode::Sync
        } else if major > LEGACY_MAJOR_VERSION {
            FlushMode::Async
        } else {
            return Err(unsupported());
        };

        connection::with_timeout(
            addr,
            command.name(),
            self.flush_timeout,
            conn.flush_all(command.name(), mode),
        )
        .await
        .map_err(|e| step_error(addr, FlushStep::Flush, e))?;

        info!("Flushed {} ({}, {:?})", addr, version, mode);
        Ok(NodeFlushOutcome {
            addr: addr.to_string(),
            version,
            asynchronous: mode == FlushMode::Async,
        })
    }
}
