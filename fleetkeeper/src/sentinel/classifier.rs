//! Sentinel event classifier
//!
//! Two states: `Listening` until the stream ends or the classifier is
//! stopped, then `Terminated` for good. A malformed event never ends the
//! loop, it becomes an [`Signal::AdvisoryError`].

use super::events::{MasterSwitch, SWITCH_MASTER, SentinelEvent, Signal, is_known_channel};
use futures_util::{Stream, StreamExt};
use std::future::Future;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Listening,
    Terminated,
}

/// Counters over the lifetime of one classifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassifierStats {
    pub events: u64,
    pub failovers: u64,
    pub advisories: u64,
    pub malformed: u64,
    /// Events on channels outside the catalog (still passed through)
    pub unknown_channels: u64,
}

#[derive(Debug)]
pub struct SentinelEventClassifier {
    state: ListenerState,
    stats: ClassifierStats,
}

impl Default for SentinelEventClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SentinelEventClassifier {
    pub fn new() -> Self {
        Self {
            state: ListenerState::Listening,
            stats: ClassifierStats::default(),
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    pub fn stats(&self) -> ClassifierStats {
        self.stats
    }

    /// Classify one event without touching state
    pub fn classify(event: &SentinelEvent) -> Signal {
        if event.channel != SWITCH_MASTER {
            return Signal::Advisory {
                channel: event.channel.clone(),
                payload: event.payload.clone(),
            };
        }

        match MasterSwitch::parse(&event.payload) {
            Ok(switch) => Signal::Failover(switch),
            Err(reason) => Signal::AdvisoryError {
                channel: event.channel.clone(),
                payload: event.payload.clone(),
                reason,
            },
        }
    }

    /// Classify and count; `None` once terminated
    pub fn observe(&mut self, event: &SentinelEvent) -> Option<Signal> {
        if self.state == ListenerState::Terminated {
            return None;
        }

        self.stats.events += 1;
        if !is_known_channel(&event.channel) {
            self.stats.unknown_channels += 1;
            debug!("Event on channel outside the catalog: {}", event.channel);
        }

        let signal = Self::classify(event);
        match &signal {
            Signal::Failover(switch) => {
                self.stats.failovers += 1;
                info!(
                    "Master {} switched from {} to {}",
                    switch.master_name, switch.old, switch.new
                );
            }
            Signal::Advisory { .. } => self.stats.advisories += 1,
            Signal::AdvisoryError {
                channel, reason, ..
            } => {
                self.stats.malformed += 1;
                warn!("Malformed {} event: {}", channel, reason);
            }
        }
        Some(signal)
    }

    pub fn terminate(&mut self) {
        self.state = ListenerState::Terminated;
    }

    /// Drive the classifier from `events` until the stream ends or `stop` resolves
    pub async fn run<S, F, Fut>(&mut self, mut events: S, stop: Fut, mut on_signal: F) -> ClassifierStats
    where
        S: Stream<Item = SentinelEvent> + Unpin,
        F: FnMut(Signal),
        Fut: Future<Output = ()>,
    {
        tokio::pin!(stop);

        while self.state == ListenerState::Listening {
            tokio::select! {
                _ = &mut stop => {
                    debug!("Sentinel classifier stopped");
                    self.terminate();
                }
                next = events.next() => match next {
                    Some(event) => {
                        if let Some(signal) = self.observe(&event) {
                            on_signal(signal);
                        }
                    }
                    None => {
                        debug!("Sentinel event stream closed");
                        self.terminate();
                    }
                },
            }
        }

        self.stats
    }
}
