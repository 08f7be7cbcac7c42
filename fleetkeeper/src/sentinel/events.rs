//! Sentinel events and signals

use serde::{Deserialize, Serialize};
use std::fmt;

/// Channel announcing a completed failover
pub const SWITCH_MASTER: &str = "+switch-master";

/// Channels a sentinel publishes lifecycle events on
pub const SENTINEL_CHANNELS: [&str; 25] = [
    "+reset-master",
    "+slave",
    "+failover-state-reconf-slaves",
    "+failover-detected",
    "+slave-reconf-sent",
    "+slave-reconf-inprog",
    "+slave-reconf-done",
    "-dup-sentinel",
    "+sentinel",
    "+sdown",
    "-sdown",
    "+odown",
    "-odown",
    "+new-epoch",
    "+try-failover",
    "+elected-leader",
    "+failover-state-select-slave",
    "no-good-slave",
    "selected-slave",
    "failover-state-send-slaveof-noone",
    "failover-end-for-timeout",
    "failover-end",
    SWITCH_MASTER,
    "+tilt",
    "-tilt",
];

/// Catalog as owned strings, ready for a subscribe call
pub fn catalog() -> Vec<String> {
    SENTINEL_CHANNELS.iter().map(|c| c.to_string()).collect()
}

/// Whether the channel is one of the known sentinel channels
pub fn is_known_channel(channel: &str) -> bool {
    SENTINEL_CHANNELS.contains(&channel)
}

/// One message pulled from a sentinel subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentinelEvent {
    pub channel: String,
    pub payload: String,
}

impl SentinelEvent {
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

/// `host:port` of a master before or after a switch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parsed `+switch-master` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterSwitch {
    pub master_name: String,
    pub old: Endpoint,
    pub new: Endpoint,
}

impl MasterSwitch {
    /// Parse `masterName oldIP oldPort newIP newPort`
    pub fn parse(payload: &str) -> Result<Self, String> {
        let tokens: Vec<&str> = payload.split_whitespace().collect();
        if tokens.len() != 5 {
            return Err(format!("expected 5 tokens, found {}", tokens.len()));
        }

        let port = |token: &str| {
            token
                .parse::<u16>()
                .map_err(|_| format!("invalid port {:?}", token))
        };

        Ok(Self {
            master_name: tokens[0].to_string(),
            old: Endpoint {
                host: tokens[1].to_string(),
                port: port(tokens[2])?,
            },
            new: Endpoint {
                host: tokens[3].to_string(),
                port: port(tokens[4])?,
            },
        })
    }
}

/// Classified sentinel event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signal {
    /// A master moved to a new endpoint
    Failover(MasterSwitch),
    /// Any other event, passed through as-is
    Advisory { channel: String, payload: String },
    /// Event on a known channel whose payload could not be read
    AdvisoryError {
        channel: String,
        payload: String,
        reason: String,
    },
}

impl Signal {
    pub fn is_failover(&self) -> bool {
        matches!(self, Self::Failover(_))
    }
}
