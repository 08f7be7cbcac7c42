//! Cluster Topology
//!
//! Read-only snapshot derived from one peer-list report: role partition,
//! master/replica links and id/address indices. Rebuild it from a fresh
//! report on every refresh instead of mutating it.

use super::parser::parse_nodes;
use super::types::{ClusterNode, MasterReplicaLink, SlotSpan, TOTAL_SLOTS};
use crate::core::{Result, TopologyError};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Default)]
struct MasterEntry {
    address: Option<String>,
    slots: String,
    replicas: Vec<(String, String)>,
}

/// Topology snapshot of one cluster
#[derive(Debug, Clone, Serialize)]
pub struct ClusterTopology {
    nodes: Vec<ClusterNode>,
    master_addresses: Vec<String>,
    replica_addresses: Vec<String>,
    master_to_replica: Vec<MasterReplicaLink>,
    id_to_address: HashMap<String, String>,
    address_to_id: HashMap<String, String>,
}

impl ClusterTopology {
    /// Parse a peer-list report and build its topology
    pub fn from_report(report: &str) -> Result<Self> {
        let nodes = parse_nodes(report)?;
        Ok(Self::build(nodes)?)
    }

    /// Build the topology from parsed nodes in a single pass
    ///
    /// Rejects snapshots where an id or an address appears twice.
    pub fn build(nodes: Vec<ClusterNode>) -> std::result::Result<Self, TopologyError> {
        let mut master_addresses = Vec::new();
        let mut replica_addresses = Vec::new();
        let mut id_to_address: HashMap<String, String> = HashMap::new();
        let mut address_to_id: HashMap<String, String> = HashMap::new();
        let mut masters: BTreeMap<String, MasterEntry> = BTreeMap::new();

        for node in &nodes {
            let is_master = node.is_master();
            if !is_master && !node.is_replica() {
                debug!(
                    "Node {} at {} has no role flag, left out of role indices",
                    node.id, node.address
                );
                continue;
            }

            if let Some(first) = id_to_address.get(&node.id) {
                return Err(TopologyError::DuplicateId {
                    id: node.id.clone(),
                    first: first.clone(),
                    second: node.address.clone(),
                });
            }
            if let Some(first) = address_to_id.get(&node.address) {
                return Err(TopologyError::DuplicateAddress {
                    address: node.address.clone(),
                    first: first.clone(),
                    second: node.id.clone(),
                });
            }
            id_to_address.insert(node.id.clone(), node.address.clone());
            address_to_id.insert(node.address.clone(), node.id.clone());

            if is_master {
                master_addresses.push(node.address.clone());
                let entry = masters.entry(node.id.clone()).or_default();
                entry.address = Some(node.address.clone());
                entry.slots = node.slot_string();
            } else {
                replica_addresses.push(node.address.clone());
                masters
                    .entry(node.master_id.clone())
                    .or_default()
                    .replicas
                    .push((node.address.clone(), node.id.clone()));
            }
        }

        let mut master_to_replica = Vec::new();
        for (master_id, entry) in masters {
            let master_addr = entry.address.unwrap_or_default();
            if entry.replicas.is_empty() {
                master_to_replica.push(MasterReplicaLink {
                    master_id,
                    master_addr,
                    replica_addr: String::new(),
                    replica_id: String::new(),
                    slots: entry.slots,
                });
                continue;
            }
            for (replica_addr, replica_id) in entry.replicas {
                master_to_replica.push(MasterReplicaLink {
                    master_id: master_id.clone(),
                    master_addr: master_addr.clone(),
                    replica_addr,
                    replica_id,
                    slots: entry.slots.clone(),
                });
            }
        }

        Ok(Self {
            nodes,
            master_addresses,
            replica_addresses,
            master_to_replica,
            id_to_address,
            address_to_id,
        })
    }

    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    pub fn master_addresses(&self) -> &[String] {
        &self.master_addresses
    }

    pub fn replica_addresses(&self) -> &[String] {
        &self.replica_addresses
    }

    /// Masters followed by replicas
    pub fn all_addresses(&self) -> Vec<String> {
        self.master_addresses
            .iter()
            .chain(self.replica_addresses.iter())
            .cloned()
            .collect()
    }

    /// One link per (master, replica); masters without replicas get one
    /// link with empty replica fields. Ordered by master id.
    pub fn master_to_replica(&self) -> &[MasterReplicaLink] {
        &self.master_to_replica
    }

    /// Links reported for one master id
    pub fn links_for(&self, master_id: &str) -> Vec<&MasterReplicaLink> {
        self.master_to_replica
            .iter()
            .filter(|l| l.master_id == master_id)
            .collect()
    }

    pub fn address_of(&self, id: &str) -> Option<&str> {
        self.id_to_address.get(id).map(String::as_str)
    }

    pub fn id_of(&self, address: &str) -> Option<&str> {
        self.address_to_id.get(address).map(String::as_str)
    }

    pub fn id_to_address(&self) -> &HashMap<String, String> {
        &self.id_to_address
    }

    pub fn address_to_id(&self) -> &HashMap<String, String> {
        &self.address_to_id
    }

    /// Replicas whose master id does not resolve to a master in this snapshot
    pub fn orphaned_replicas(&self) -> Vec<&ClusterNode> {
        self.nodes
            .iter()
            .filter(|n| n.is_replica())
            .filter(|n| match self.address_of(&n.master_id) {
                Some(addr) => !self.master_addresses.iter().any(|m| m == addr),
                None => true,
            })
            .collect()
    }

    /// Nodes flagged `fail` or `fail?`
    pub fn failing_nodes(&self) -> Vec<&ClusterNode> {
        self.nodes.iter().filter(|n| n.is_failing()).collect()
    }

    /// Hash slots owned by no master, as merged inclusive ranges
    pub fn uncovered_slots(&self) -> Vec<SlotSpan> {
        let mut covered = vec![false; TOTAL_SLOTS as usize];
        for node in self.nodes.iter().filter(|n| n.is_master()) {
            for span in node.slot_spans() {
                for slot in span.start..=span.end {
                    covered[slot as usize] = true;
                }
            }
        }

        let mut gaps = Vec::new();
        let mut start: Option<u16> = None;
        for (slot, &owned) in covered.iter().enumerate() {
            let slot = slot as u16;
            match (owned, start) {
                (false, None) => start = Some(slot),
                (true, Some(s)) => {
                    gaps.push(SlotSpan {
                        start: s,
                        end: slot - 1,
                    });
                    start = None;
                }
                _ => {}
            }
        }
        if let Some(s) = start {
            gaps.push(SlotSpan {
                start: s,
                end: TOTAL_SLOTS - 1,
            });
        }
        gaps
    }
}
