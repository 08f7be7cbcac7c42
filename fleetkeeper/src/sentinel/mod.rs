//! Sentinel monitoring
//!
//! Turns a sentinel's push notifications into typed signals:
//! - `+switch-master` becomes a failover signal with old/new endpoints
//! - every other channel is passed through as an advisory
//! - malformed payloads are reported without stopping the listener

pub mod classifier;
pub mod events;
pub mod monitor;

pub use classifier::{ClassifierStats, ListenerState, SentinelEventClassifier};
pub use events::{
    Endpoint, MasterSwitch, SENTINEL_CHANNELS, SWITCH_MASTER, SentinelEvent, Signal, catalog,
    is_known_channel,
};
pub use monitor::{SentinelMonitor, signal_notice};

#[cfg(test)]
mod tests;
