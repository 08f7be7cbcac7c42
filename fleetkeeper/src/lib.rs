pub mod cluster;
pub mod config;
pub mod connection;
pub mod core;
pub mod monitoring;
pub mod notify;
pub mod sentinel;

// Re-export commonly used types
pub use cluster::{
    ClusterFlushOrchestrator, ClusterNode, ClusterTopology, FleetConfigManager, FlushCommand,
    FlushReport, parse_nodes,
};
pub use config::MonitorConfig;
pub use connection::{NodeConnection, NodeConnector, RedisConnector};
pub use core::{
    ConsistencyError, FleetError, FleetSpec, ParseError, Result, TopologyError,
};
pub use monitoring::{Monitor, MonitorSettings};
pub use notify::{Code, ConsoleNotifier, LogNotifier, Notice, Notifier};
pub use sentinel::{SentinelEvent, SentinelEventClassifier, SentinelMonitor, Signal};
