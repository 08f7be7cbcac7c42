//! Node connections
//!
//! The fleet operations only talk to nodes through [`NodeConnector`] and
//! [`NodeConnection`]. The production implementation lives in
//! [`redis_node`] and rides on the `redis` crate.

use crate::core::{FleetError, Result};
use crate::sentinel::SentinelEvent;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::future::Future;
use std::time::Duration;

#[cfg(test)]
pub(crate) mod mock;
pub mod redis_node;

pub use redis_node::{RedisConnector, RedisNodeConnection};

/// Push messages from a subscription, ends when the connection closes
pub type EventStream = BoxStream<'static, SentinelEvent>;

/// How a flush command is issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Blocks the node until every key is gone
    Sync,
    /// `ASYNC` variant, frees memory in the background
    Async,
}

/// Opens connections to nodes
#[async_trait]
pub trait NodeConnector: Send + Sync {
    /// Connect and PING; the returned connection is ready for commands
    async fn connect(&self, addr: &str, password: Option<&str>)
    -> Result<Box<dyn NodeConnection>>;
}

/// An open connection to one node
#[async_trait]
pub trait NodeConnection: Send {
    fn addr(&self) -> &str;

    async fn ping(&mut self) -> Result<()>;

    /// `CONFIG GET key`, value of the first matching pair
    async fn config_get(&mut self, key: &str) -> Result<String>;

    async fn config_set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Run `command` (`FLUSHALL` or its renamed alias), with `ASYNC` appended in async mode
    async fn flush_all(&mut self, command: &str, mode: FlushMode) -> Result<()>;

    /// Raw `INFO` report
    async fn info(&mut self) -> Result<String>;

    /// Raw `CLUSTER NODES` report
    async fn cluster_nodes(&mut self) -> Result<String>;

    async fn set_with_ttl(&mut self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn get(&mut self, key: &str) -> Result<Option<String>>;

    /// Subscribe to push channels on a dedicated connection
    async fn subscribe(&mut self, channels: &[String]) -> Result<EventStream>;

    /// Release the connection; later commands fail
    async fn close(&mut self);
}

/// Run `fut` under `after`, mapping expiry to [`FleetError::Timeout`]
pub async fn with_timeout<T, F>(addr: &str, operation: &str, after: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(FleetError::Timeout {
            addr: addr.to_string(),
            operation: operation.to_string(),
            after,
        }),
    }
}

/// Connect under a timeout
pub async fn open(
    connector: &dyn NodeConnector,
    addr: &str,
    password: Option<&str>,
    after: Duration,
) -> Result<Box<dyn NodeConnection>> {
    with_timeout(addr, "connect", after, connector.connect(addr, password)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_with_timeout_maps_elapsed() {
        let result: Result<()> = with_timeout(
            "10.0.0.1:6379",
            "CONFIG GET",
            Duration::from_millis(10),
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            },
        )
        .await;

        match result {
            Err(FleetError::Timeout { addr, operation, .. }) => {
                assert_eq!(addr, "10.0.0.1:6379");
                assert_eq!(operation, "CONFIG GET");
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_with_timeout_passes_result_through() {
        let value = with_timeout("a:1", "INFO", Duration::from_secs(1), async {
            Ok::<_, FleetError>(7)
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
    }
}
