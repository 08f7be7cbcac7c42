//! In-memory nodes for tests

use super::{EventStream, FlushMode, NodeConnection, NodeConnector};
use crate::core::{FleetError, Result};
use crate::sentinel::SentinelEvent;
use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// State of one fake node
#[derive(Debug, Clone, Default)]
pub struct MockNode {
    pub config: HashMap<String, String>,
    pub version: String,
    pub role: String,
    pub keys: HashMap<String, String>,
    pub cluster_nodes: String,
    pub events: Vec<SentinelEvent>,
    /// Keep the subscription open after the last event
    pub hold_stream: bool,
    pub unreachable: bool,
    /// Refuse connections once this many have been accepted
    pub refuse_after: Option<usize>,
    pub connects: usize,
    pub fail_config_set: bool,
    pub fail_flush: bool,
    pub fail_info: bool,
    pub fail_set: bool,
    /// Delay before every command reply
    pub delay: Option<Duration>,
}

impl MockNode {
    pub fn with_version(version: &str) -> Self {
        Self {
            version: version.to_string(),
            role: "master".to_string(),
            ..Default::default()
        }
    }

    pub fn config(mut self, key: &str, value: &str) -> Self {
        self.config.insert(key.to_string(), value.to_string());
        self
    }
}

/// Recorded interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect(String),
    ConfigGet(String, String),
    ConfigSet(String, String, String),
    Flush(String, String, FlushMode),
    Info(String),
    ClusterNodes(String),
    Set(String, String),
    Get(String, String),
    Subscribe(String),
    Close(String),
}

#[derive(Clone, Default)]
pub struct MockConnector {
    nodes: Arc<Mutex<HashMap<String, MockNode>>>,
    calls: Arc<Mutex<Vec<Call>>>,
    open: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, addr: &str, node: MockNode) -> &Self {
        self.nodes.lock().insert(addr.to_string(), node);
        self
    }

    pub fn node(&self, addr: &str) -> MockNode {
        self.nodes.lock().get(addr).cloned().unwrap_or_default()
    }

    pub fn update(&self, addr: &str, f: impl FnOnce(&mut MockNode)) {
        if let Some(node) = self.nodes.lock().get_mut(addr) {
            f(node);
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn config_sets(&self) -> Vec<(String, String, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::ConfigSet(addr, key, value) => Some((addr, key, value)),
                _ => None,
            })
            .collect()
    }

    pub fn flushes(&self) -> Vec<(String, String, FlushMode)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Flush(addr, cmd, mode) => Some((addr, cmd, mode)),
                _ => None,
            })
            .collect()
    }

    /// Connections opened and not yet closed
    pub fn open_connections(&self) -> usize {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeConnector for MockConnector {
    async fn connect(
        &self,
        addr: &str,
        _password: Option<&str>,
    ) -> Result<Box<dyn NodeConnection>> {
        self.calls.lock().push(Call::Connect(addr.to_string()));
        let reachable = match self.nodes.lock().get_mut(addr) {
            Some(n) if !n.unreachable => {
                n.connects += 1;
                n.refuse_after.is_none_or(|limit| n.connects <= limit)
            }
            _ => false,
        };
        if !reachable {
            return Err(FleetError::Connection {
                addr: addr.to_string(),
                reason: "connection refused".to_string(),
            });
        }

        self.open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            addr: addr.to_string(),
            connector: self.clone(),
            closed: false,
        }))
    }
}

pub struct MockConnection {
    addr: String,
    connector: MockConnector,
    closed: bool,
}

impl MockConnection {
    fn record(&self, call: Call) {
        self.connector.calls.lock().push(call);
    }

    async fn with_node<T>(&self, f: impl FnOnce(&mut MockNode) -> Result<T>) -> Result<T> {
        if self.closed {
            return Err(FleetError::Connection {
                addr: self.addr.clone(),
                reason: "connection already closed".to_string(),
            });
        }
        let delay = self.connector.node(&self.addr).delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut nodes = self.connector.nodes.lock();
        let node = nodes.entry(self.addr.clone()).or_default();
        f(node)
    }
}

#[async_trait]
impl NodeConnection for MockConnection {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn ping(&mut self) -> Result<()> {
        self.with_node(|_| Ok(())).await
    }

    async fn config_get(&mut self, key: &str) -> Result<String> {
        self.record(Call::ConfigGet(self.addr.clone(), key.to_string()));
        let addr = self.addr.clone();
        self.with_node(|n| {
            n.config.get(key).cloned().ok_or_else(|| {
                FleetError::command(&addr, format!("CONFIG GET {}", key), "no such parameter")
            })
        })
        .await
    }

    async fn config_set(&mut self, key: &str, value: &str) -> Result<()> {
        self.record(Call::ConfigSet(
            self.addr.clone(),
            key.to_string(),
            value.to_string(),
        ));
        let addr = self.addr.clone();
        self.with_node(|n| {
            if n.fail_config_set {
                return Err(FleetError::command(&addr, "CONFIG SET", "ERR read only"));
            }
            n.config.insert(key.to_string(), value.to_string());
            Ok(())
        })
        .await
    }

    async fn flush_all(&mut self, command: &str, mode: FlushMode) -> Result<()> {
        self.record(Call::Flush(self.addr.clone(), command.to_string(), mode));
        let addr = self.addr.clone();
        self.with_node(|n| {
            if n.fail_flush {
                return Err(FleetError::command(&addr, command, "LOADING"));
            }
            n.keys.clear();
            Ok(())
        })
        .await
    }

    async fn info(&mut self) -> Result<String> {
        self.record(Call::Info(self.addr.clone()));
        let addr = self.addr.clone();
        self.with_node(|n| {
            if n.fail_info {
                return Err(FleetError::command(&addr, "INFO", "ERR"));
            }
            Ok(format!(
                "# Server\r\nredis_version:{}\r\nredis_mode:cluster\r\n\r\n# Replication\r\nrole:{}\r\nconnected_slaves:0\r\n",
                n.version, n.role
            ))
        })
        .await
    }

    async fn cluster_nodes(&mut self) -> Result<String> {
        self.record(Call::ClusterNodes(self.addr.clone()));
        self.with_node(|n| Ok(n.cluster_nodes.clone())).await
    }

    async fn set_with_ttl(&mut self, key: &str, value: &str, _ttl: Duration) -> Result<()> {
        self.record(Call::Set(self.addr.clone(), key.to_string()));
        let addr = self.addr.clone();
        self.with_node(|n| {
            if n.fail_set {
                return Err(FleetError::command(&addr, "SET", "READONLY"));
            }
            n.keys.insert(key.to_string(), value.to_string());
            Ok(())
        })
        .await
    }

    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        self.record(Call::Get(self.addr.clone(), key.to_string()));
        self.with_node(|n| Ok(n.keys.get(key).cloned())).await
    }

    async fn subscribe(&mut self, _channels: &[String]) -> Result<EventStream> {
        self.record(Call::Subscribe(self.addr.clone()));
        let (events, hold) = self
            .with_node(|n| Ok((n.events.clone(), n.hold_stream)))
            .await?;
        let events = futures_util::stream::iter(events);
        if hold {
            Ok(events.chain(futures_util::stream::pending()).boxed())
        } else {
            Ok(events.boxed())
        }
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.record(Call::Close(self.addr.clone()));
            self.connector.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
