pub mod error;
pub mod fleet;

pub use error::{
    ConsistencyError, FleetError, FlushStep, NodeField, ParseError, Result, TopologyError,
};
pub use fleet::{ClusterFleet, FleetSpec, SentinelFleet, StandaloneFleet};
