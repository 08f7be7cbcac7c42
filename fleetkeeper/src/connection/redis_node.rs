//! Node connections over the `redis` crate

use super::{EventStream, FlushMode, NodeConnection, NodeConnector};
use crate::core::{FleetError, Result};
use crate::sentinel::SentinelEvent;
use async_trait::async_trait;
use futures_util::StreamExt;
use redis::Client;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Connector for real nodes (standalone, cluster members and sentinels)
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisConnector;

impl RedisConnector {
    pub fn new() -> Self {
        Self
    }

    fn url(&self, addr: &str, password: Option<&str>) -> Result<Url> {
        let invalid = |reason: String| FleetError::Connection {
            addr: addr.to_string(),
            reason,
        };

        let mut url = Url::parse(&format!("redis://{}", addr))
            .map_err(|e| invalid(format!("invalid address: {}", e)))?;
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            url.set_password(Some(password))
                .map_err(|_| invalid("password cannot be set on this address".to_string()))?;
        }
        Ok(url)
    }
}

#[async_trait]
impl NodeConnector for RedisConnector {
    async fn connect(
        &self,
        addr: &str,
        password: Option<&str>,
    ) -> Result<Box<dyn NodeConnection>> {
        let url = self.url(addr, password)?;
        let connection_error = |e: redis::RedisError| FleetError::Connection {
            addr: addr.to_string(),
            reason: e.to_string(),
        };

        let client = Client::open(url.as_str()).map_err(connection_error)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(connection_error)?;

        let mut node = RedisNodeConnection {
            addr: addr.to_string(),
            client,
            conn: Some(conn),
        };
        node.ping().await.map_err(|e| FleetError::Connection {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;

        debug!("Connected to {}", addr);
        Ok(Box::new(node))
    }
}

/// Multiplexed connection to one node
pub struct RedisNodeConnection {
    addr: String,
    client: Client,
    conn: Option<MultiplexedConnection>,
}

fn live<'a>(
    addr: &str,
    conn: &'a mut Option<MultiplexedConnection>,
) -> Result<&'a mut MultiplexedConnection> {
    conn.as_mut().ok_or_else(|| FleetError::Connection {
        addr: addr.to_string(),
        reason: "connection already closed".to_string(),
    })
}

#[async_trait]
impl NodeConnection for RedisNodeConnection {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn ping(&mut self) -> Result<()> {
        let conn = live(&self.addr, &mut self.conn)?;
        let _: String = redis::cmd("PING")
            .query_async(conn)
            .await
            .map_err(|e| FleetError::command(&self.addr, "PING", e))?;
        Ok(())
    }

    async fn config_get(&mut self, key: &str) -> Result<String> {
        let command = format!("CONFIG GET {}", key);
        let conn = live(&self.addr, &mut self.conn)?;
        let pairs: Vec<String> = redis::cmd("CONFIG")
            .arg("GET")
            .arg(key)
            .query_async(conn)
            .await
            .map_err(|e| FleetError::command(&self.addr, &command, e))?;

        pairs
            .into_iter()
            .nth(1)
            .ok_or_else(|| FleetError::command(&self.addr, &command, "no such config parameter"))
    }

    async fn config_set(&mut self, key: &str, value: &str) -> Result<()> {
        let conn = live(&self.addr, &mut self.conn)?;
        let _: () = redis::cmd("CONFIG")
            .arg("SET")
            .arg(key)
            .arg(value)
            .query_async(conn)
            .await
            .map_err(|e| FleetError::command(&self.addr, format!("CONFIG SET {}", key), e))?;
        Ok(())
    }

    async fn flush_all(&mut self, command: &str, mode: FlushMode) -> Result<()> {
        let mut cmd = redis::cmd(command);
        if mode == FlushMode::Async {
            cmd.arg("ASYNC");
        }
        let conn = live(&self.addr, &mut self.conn)?;
        let _: () = cmd
            .query_async(conn)
            .await
            .map_err(|e| FleetError::command(&self.addr, command, e))?;
        Ok(())
    }

    async fn info(&mut self) -> Result<String> {
        let conn = live(&self.addr, &mut self.conn)?;
        redis::cmd("INFO")
            .query_async(conn)
            .await
            .map_err(|e| FleetError::command(&self.addr, "INFO", e))
    }

    async fn cluster_nodes(&mut self) -> Result<String> {
        let conn = live(&self.addr, &mut self.conn)?;
        redis::cmd("CLUSTER")
            .arg("NODES")
            .query_async(conn)
            .await
            .map_err(|e| FleetError::command(&self.addr, "CLUSTER NODES", e))
    }

    async fn set_with_ttl(&mut self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let conn = live(&self.addr, &mut self.conn)?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(conn)
            .await
            .map_err(|e| FleetError::command(&self.addr, "SET", e))?;
        Ok(())
    }

    async fn get(&mut self, key: &str) -> Result<Option<String>> {
        let conn = live(&self.addr, &mut self.conn)?;
        redis::cmd("GET")
            .arg(key)
            .query_async(conn)
            .await
            .map_err(|e| FleetError::command(&self.addr, "GET", e))
    }

    async fn subscribe(&mut self, channels: &[String]) -> Result<EventStream> {
        let subscription_error = |e: redis::RedisError| FleetError::Subscription {
            addr: self.addr.clone(),
            reason: e.to_string(),
        };

        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(subscription_error)?;
        for channel in channels {
            pubsub
                .subscribe(channel.as_str())
                .await
                .map_err(subscription_error)?;
        }
        debug!("Subscribed to {} channels on {}", channels.len(), self.addr);

        let stream = pubsub.into_on_message().map(|msg| {
            SentinelEvent::new(msg.get_channel_name(), decode_payload(msg.get_payload_bytes()))
        });
        Ok(stream.boxed())
    }

    async fn close(&mut self) {
        if self.conn.take().is_some() {
            debug!("Closed connection to {}", self.addr);
        }
    }
}

/// Payload text, invalid UTF-8 replaced instead of dropped
fn decode_payload(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_without_password() {
        let url = RedisConnector::new().url("127.0.0.1:6379", None).unwrap();
        assert_eq!(url.as_str(), "redis://127.0.0.1:6379");
    }

    #[test]
    fn test_url_with_password() {
        let url = RedisConnector::new()
            .url("10.0.0.5:7000", Some("s3cr3t"))
            .unwrap();
        assert_eq!(url.password(), Some("s3cr3t"));
        assert_eq!(url.port(), Some(7000));
        assert_eq!(url.host_str(), Some("10.0.0.5"));
    }

    #[test]
    fn test_url_ignores_empty_password() {
        let url = RedisConnector::new().url("10.0.0.5:7000", Some("")).unwrap();
        assert_eq!(url.password(), None);
    }

    #[test]
    fn test_decode_payload_keeps_text() {
        assert_eq!(
            decode_payload(b"mymaster 10.0.0.1 6379 10.0.0.2 6379"),
            "mymaster 10.0.0.1 6379 10.0.0.2 6379"
        );
        let decoded = decode_payload(b"master \xffbad 10.0.0.1 6379");
        assert!(decoded.starts_with("master "));
        assert!(decoded.ends_with("bad 10.0.0.1 6379"));
        assert!(decoded.contains('\u{FFFD}'));
    }
}
