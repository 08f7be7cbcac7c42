//! Fleet descriptions
//!
//! One variant per deployment topology, so monitors dispatch with an
//! exhaustive `match` instead of inspecting loosely typed app info.

use serde::{Deserialize, Serialize};

/// A managed deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FleetSpec {
    Standalone(StandaloneFleet),
    Sentinel(SentinelFleet),
    Cluster(ClusterFleet),
}

/// Master/replica pairs without supervision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandaloneFleet {
    pub app_id: i64,
    pub app_name: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub masters: Vec<String>,
    #[serde(default)]
    pub replicas: Vec<String>,
}

impl StandaloneFleet {
    /// Masters followed by replicas
    pub fn instances(&self) -> Vec<String> {
        self.masters
            .iter()
            .chain(self.replicas.iter())
            .cloned()
            .collect()
    }
}

/// Sentinel-supervised failover groups
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentinelFleet {
    pub app_id: i64,
    pub app_name: String,
    #[serde(default)]
    pub password: Option<String>,
    pub sentinels: Vec<String>,
    #[serde(default)]
    pub master_names: Vec<String>,
}

/// Sharded cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterFleet {
    pub app_id: i64,
    pub app_name: String,
    #[serde(default)]
    pub password: Option<String>,
    pub instances: Vec<String>,
}

impl FleetSpec {
    pub fn app_name(&self) -> &str {
        match self {
            Self::Standalone(f) => &f.app_name,
            Self::Sentinel(f) => &f.app_name,
            Self::Cluster(f) => &f.app_name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Standalone(_) => "standalone",
            Self::Sentinel(_) => "sentinel",
            Self::Cluster(_) => "cluster",
        }
    }

    /// Every address the fleet description names
    pub fn addresses(&self) -> Vec<String> {
        match self {
            Self::Standalone(f) => f.instances(),
            Self::Sentinel(f) => f.sentinels.clone(),
            Self::Cluster(f) => f.instances.clone(),
        }
    }
}
