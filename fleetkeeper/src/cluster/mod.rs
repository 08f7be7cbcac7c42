//! Cluster Operations
//!
//! Works on live sharded clusters:
//! - Peer-list report parsing (`CLUSTER NODES`)
//! - Topology snapshots with master/replica links and id/address indices
//! - Fleet-wide config consistency check and batched set
//! - Version-aware cluster-wide flush

pub mod fleet_config;
pub mod flush;
pub mod parser;
pub mod topology;
pub mod types;

pub use fleet_config::{DEFAULT_COMMAND_TIMEOUT, FleetConfigManager};
pub use flush::{
    ClusterFlushOrchestrator, DEFAULT_FLUSH_TIMEOUT, FlushCommand, FlushReport, NODE_TIMEOUT_KEY,
    NodeFlushOutcome, RELAXED_NODE_TIMEOUT,
};
pub use parser::{parse_line, parse_nodes};
pub use topology::ClusterTopology;
pub use types::{
    ClusterNode, LinkState, MasterReplicaLink, NO_MASTER, NodeFlag, SlotSpan, TOTAL_SLOTS,
};
