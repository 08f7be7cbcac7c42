//! Sentinel monitor
//!
//! Subscribes to a sentinel's event channels and reports every classified
//! event through the notifier.

use super::classifier::{ClassifierStats, SentinelEventClassifier};
use super::events::{Signal, catalog};
use crate::connection::{self, NodeConnector};
use crate::core::Result;
use crate::notify::{Code, Notice, Notifier};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, warn};

const ADVISORY_TITLE: &str = "redis sentinel event";

pub struct SentinelMonitor {
    connector: Arc<dyn NodeConnector>,
    notifier: Arc<dyn Notifier>,
    password: Option<String>,
    connect_timeout: Duration,
}

impl SentinelMonitor {
    pub fn new(
        connector: Arc<dyn NodeConnector>,
        notifier: Arc<dyn Notifier>,
        password: Option<String>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            connector,
            notifier,
            password,
            connect_timeout,
        }
    }

    /// Listen on the sentinel at `addr` until its stream closes or `stop` resolves
    ///
    /// Connect and subscribe failures are notified before being returned, and
    /// so is a stream that closes before `stop` resolves.
    pub async fn run<F>(&self, addr: &str, stop: F) -> Result<ClassifierStats>
    where
        F: Future<Output = ()>,
    {
        let events = match self.subscribe(addr).await {
            Ok(events) => events,
            Err(e) => {
                warn!("Cannot listen on sentinel {}: {}", addr, e);
                self.notifier
                    .notify(&Notice::error(Code::MonitorSentinelError, &e));
                return Err(e);
            }
        };

        info!("Listening for sentinel events on {}", addr);
        let requested = AtomicBool::new(false);
        let stop = async {
            stop.await;
            requested.store(true, Ordering::SeqCst);
        };
        let mut classifier = SentinelEventClassifier::new();
        let stats = classifier
            .run(events, stop, |signal| {
                self.notifier.notify(&signal_notice(addr, &signal))
            })
            .await;

        if !requested.load(Ordering::SeqCst) {
            warn!("Sentinel {} closed its event stream", addr);
            self.notifier.notify(&Notice::error(
                Code::MonitorSentinelError,
                format!("sentinel {}: event stream closed", addr),
            ));
        }
        info!(
            "Sentinel {} listener terminated after {} events ({} failovers, {} malformed)",
            addr, stats.events, stats.failovers, stats.malformed
        );
        Ok(stats)
    }

    async fn subscribe(&self, addr: &str) -> Result<connection::EventStream> {
        let mut conn = connection::open(
            self.connector.as_ref(),
            addr,
            self.password.as_deref(),
            self.connect_timeout,
        )
        .await?;

        let channels = catalog();
        let result = connection::with_timeout(
            addr,
            "SUBSCRIBE",
            self.connect_timeout,
            conn.subscribe(&channels),
        )
        .await;
        conn.close().await;
        result
    }
}

/// Notice for one classified event from the sentinel at `addr`
pub fn signal_notice(addr: &str, signal: &Signal) -> Notice {
    match signal {
        Signal::Failover(switch) => Notice::error(
            Code::MonitorSentinelError,
            format!(
                "sentinel {}: master {} switched from {} to {}",
                addr, switch.master_name, switch.old, switch.new
            ),
        ),
        Signal::Advisory { channel, payload } => {
            Notice::content(Code::Success, ADVISORY_TITLE, format!("{} {}", channel, payload))
        }
        Signal::AdvisoryError {
            channel,
            payload,
            reason,
        } => Notice::error(
            Code::MonitorSentinelError,
            format!(
                "sentinel {}: malformed {} event {:?}: {}",
                addr, channel, payload, reason
            ),
        ),
    }
}
