//! Fleet configuration consistency check and batched set
//!
//! Nodes are visited one at a time. Every per-node step (connect and
//! command) runs under its own timeout and the connection is closed before
//! moving on, whatever the outcome.
//!
//! `set` is not transactional: when the write to node N fails, nodes before
//! N keep the new value. Callers re-run after fixing the failing node.

use crate::connection::{self, NodeConnector};
use crate::core::{ConsistencyError, FleetError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default per-node timeout for config reads and writes
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct FleetConfigManager {
    connector: Arc<dyn NodeConnector>,
    password: Option<String>,
    timeout: Duration,
}

impl FleetConfigManager {
    pub fn new(connector: Arc<dyn NodeConnector>, password: Option<String>) -> Self {
        Self {
            connector,
            password,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Set the per-node timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Read `key` from every address and return the value they all agree on
    ///
    /// Stops at the first node that disagrees with the first one.
    pub async fn get(&self, addrs: &[String], key: &str) -> Result<String> {
        let Some(first_addr) = addrs.first() else {
            return Err(FleetError::EmptyFleet {
                operation: format!("CONFIG GET {}", key),
            });
        };

        let mut agreed: Option<String> = None;
        for addr in addrs {
            let value = self.read(addr, key).await?;
            debug!("{} {} = {}", addr, key, value);

            match &agreed {
                Some(expected) if *expected != value => {
                    warn!(
                        "Config {} diverges: {} has {:?}, {} has {:?}",
                        key, first_addr, expected, addr, value
                    );
                    return Err(ConsistencyError {
                        key: key.to_string(),
                        first_addr: first_addr.clone(),
                        value: expected.clone(),
                        mismatch_addr: addr.clone(),
                        mismatch_value: value,
                    }
                    .into());
                }
                Some(_) => {}
                None => agreed = Some(value),
            }
        }

        Ok(agreed.unwrap_or_default())
    }

    /// Write `value` to every address after checking they currently agree
    ///
    /// A fleet already split on `key` is never written to.
    pub async fn set(&self, addrs: &[String], key: &str, value: &str) -> Result<()> {
        let current = self.get(addrs, key).await?;
        info!(
            "Setting {} from {:?} to {:?} on {} nodes",
            key,
            current,
            value,
            addrs.len()
        );

        for addr in addrs {
            self.write(addr, key, value).await?;
        }
        Ok(())
    }

    /// Write `value` to every address without reading first
    ///
    /// Keeps going past failing nodes and returns them with their errors.
    pub async fn restore(
        &self,
        addrs: &[String],
        key: &str,
        value: &str,
    ) -> Vec<(String, FleetError)> {
        let mut failed = Vec::new();
        for addr in addrs {
            if let Err(e) = self.write(addr, key, value).await {
                failed.push((addr.clone(), e));
            }
        }
        failed
    }

    async fn read(&self, addr: &str, key: &str) -> Result<String> {
        let mut conn = connection::open(
            self.connector.as_ref(),
            addr,
            self.password.as_deref(),
            self.timeout,
        )
        .await?;
        let result =
            connection::with_timeout(addr, "CONFIG GET", self.timeout, conn.config_get(key)).await;
        conn.close().await;
        result
    }

    async fn write(&self, addr: &str, key: &str, value: &str) -> Result<()> {
        let mut conn = connection::open(
            self.connector.as_ref(),
            addr,
            self.password.as_deref(),
            self.timeout,
        )
        .await?;
        let result = connection::with_timeout(
            addr,
            "CONFIG SET",
            self.timeout,
            conn.config_set(key, value),
        )
        .await;
        conn.close().await;

        if let Err(e) = &result {
            warn!("Setting {} to {:?} on {} failed: {}", key, value, addr, e);
        }
        result
    }
}
