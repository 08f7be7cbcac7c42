use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Field of a peer-list report line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeField {
    Id,
    Address,
    BusPort,
    Flags,
    MasterId,
    PingSent,
    PongRecv,
    ConfigEpoch,
    LinkState,
}

impl NodeField {
    /// Fixed fields in report order
    pub const FIXED: [NodeField; 8] = [
        NodeField::Id,
        NodeField::Address,
        NodeField::Flags,
        NodeField::MasterId,
        NodeField::PingSent,
        NodeField::PongRecv,
        NodeField::ConfigEpoch,
        NodeField::LinkState,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Address => "address",
            Self::BusPort => "bus-port",
            Self::Flags => "flags",
            Self::MasterId => "master-id",
            Self::PingSent => "ping-sent",
            Self::PongRecv => "pong-recv",
            Self::ConfigEpoch => "config-epoch",
            Self::LinkState => "link-state",
        }
    }
}

impl fmt::Display for NodeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Malformed peer-list report
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: invalid {field} {value:?} for node {address}: {reason}")]
pub struct ParseError {
    /// 1-based line number in the report
    pub line: usize,
    /// Node address, or `<unknown>` when the address itself is missing
    pub address: String,
    pub field: NodeField,
    pub value: String,
    pub reason: String,
}

/// Snapshot that cannot be turned into a topology
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("Duplicate node id {id} at {first} and {second}")]
    DuplicateId {
        id: String,
        first: String,
        second: String,
    },
    #[error("Duplicate node address {address} for ids {first} and {second}")]
    DuplicateAddress {
        address: String,
        first: String,
        second: String,
    },
}

/// Fleet disagreement on a configuration value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Config {key} is inconsistent: {first_addr} has {value:?} but {mismatch_addr} has {mismatch_value:?}"
)]
pub struct ConsistencyError {
    pub key: String,
    pub first_addr: String,
    pub value: String,
    pub mismatch_addr: String,
    pub mismatch_value: String,
}

/// Step of a cluster flush run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStep {
    Connect,
    DetectVersion,
    RelaxTimeout,
    Flush,
    RestoreTimeout,
}

impl fmt::Display for FlushStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::DetectVersion => "detect version",
            Self::RelaxTimeout => "relax cluster-node-timeout",
            Self::Flush => "flush",
            Self::RestoreTimeout => "restore cluster-node-timeout",
        })
    }
}

/// Main error type for fleet operations
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("Connection to {addr} failed: {reason}")]
    Connection { addr: String, reason: String },

    #[error("Command {command} on {addr} failed: {reason}")]
    Command {
        addr: String,
        command: String,
        reason: String,
    },

    #[error("{operation} on {addr} timed out after {after:?}")]
    Timeout {
        addr: String,
        operation: String,
        after: Duration,
    },

    #[error("{0}")]
    Consistency(#[from] ConsistencyError),

    #[error("Cluster flush aborted at {addr} ({step}): {source}")]
    Orchestration {
        addr: String,
        step: FlushStep,
        #[source]
        source: Box<FleetError>,
    },

    #[error(
        "{cause}; {key} still not restored to {value:?} on {}",
        .unrestored.join(", ")
    )]
    RestoreIncomplete {
        key: String,
        value: String,
        /// Nodes left at the relaxed value
        unrestored: Vec<String>,
        #[source]
        cause: Box<FleetError>,
    },

    #[error("Unsupported server version {version:?} on {addr}")]
    UnsupportedVersion { addr: String, version: String },

    #[error("No addresses given for {operation}")]
    EmptyFleet { operation: String },

    #[error("Subscription on {addr} failed: {reason}")]
    Subscription { addr: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FleetError {
    /// Address of the node the error is attached to, if any
    pub fn addr(&self) -> Option<&str> {
        match self {
            Self::Connection { addr, .. }
            | Self::Command { addr, .. }
            | Self::Timeout { addr, .. }
            | Self::Orchestration { addr, .. }
            | Self::UnsupportedVersion { addr, .. }
            | Self::Subscription { addr, .. } => Some(addr),
            Self::Consistency(e) => Some(&e.mismatch_addr),
            Self::RestoreIncomplete { cause, .. } => cause.addr(),
            _ => None,
        }
    }

    pub(crate) fn command(addr: &str, command: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Command {
            addr: addr.to_string(),
            command: command.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for fleet operations
pub type Result<T> = std::result::Result<T, FleetError>;
