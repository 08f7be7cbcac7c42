use serde::{Deserialize, Serialize};
use std::fmt;

/// Total number of hash slots
pub const TOTAL_SLOTS: u16 = 16384;

/// Master-id placeholder reported by masters
pub const NO_MASTER: &str = "-";

/// Role/health tag of a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeFlag {
    Myself,
    Master,
    Slave,
    /// `fail?`: failure suspected by this node only
    PFail,
    Fail,
    Handshake,
    NoAddr,
    NoFailover,
    NoFlags,
    Other(String),
}

impl NodeFlag {
    pub fn parse(token: &str) -> Self {
        match token {
            "myself" => Self::Myself,
            "master" => Self::Master,
            "slave" => Self::Slave,
            "fail?" => Self::PFail,
            "fail" => Self::Fail,
            "handshake" => Self::Handshake,
            "noaddr" => Self::NoAddr,
            "nofailover" => Self::NoFailover,
            "noflags" => Self::NoFlags,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Myself => "myself",
            Self::Master => "master",
            Self::Slave => "slave",
            Self::PFail => "fail?",
            Self::Fail => "fail",
            Self::Handshake => "handshake",
            Self::NoAddr => "noaddr",
            Self::NoFailover => "nofailover",
            Self::NoFlags => "noflags",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for NodeFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of the node-to-node bus link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Connected,
    Disconnected,
}

impl LinkState {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "connected" => Some(Self::Connected),
            "disconnected" => Some(Self::Disconnected),
            _ => None,
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        })
    }
}

/// One line of a peer-list report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNode {
    pub id: String,
    /// Client-facing `host:port`
    pub address: String,
    /// Gossip bus port, absent on 3.x reports
    pub bus_port: Option<u16>,
    /// Announced hostname (`addr@bus,hostname` on 7.x reports)
    pub hostname: Option<String>,
    pub flags: Vec<NodeFlag>,
    /// Owning master id, or [`NO_MASTER`]
    pub master_id: String,
    /// Unix millis, 0 means never
    pub ping_sent_at: u64,
    pub pong_recv_at: u64,
    pub config_epoch: u64,
    pub link_state: LinkState,
    /// Slot tokens as reported (`0-5460`, `5461`, `[93->-id]`)
    pub slot_ranges: Vec<String>,
}

impl ClusterNode {
    pub fn has_flag(&self, flag: &NodeFlag) -> bool {
        self.flags.contains(flag)
    }

    pub fn is_master(&self) -> bool {
        self.has_flag(&NodeFlag::Master)
    }

    /// Replica role; a node carrying both role flags counts as a master
    pub fn is_replica(&self) -> bool {
        self.has_flag(&NodeFlag::Slave) && !self.is_master()
    }

    pub fn is_myself(&self) -> bool {
        self.has_flag(&NodeFlag::Myself)
    }

    /// `fail` or `fail?`
    pub fn is_failing(&self) -> bool {
        self.has_flag(&NodeFlag::Fail) || self.has_flag(&NodeFlag::PFail)
    }

    pub fn master_id(&self) -> Option<&str> {
        if self.master_id == NO_MASTER {
            None
        } else {
            Some(&self.master_id)
        }
    }

    /// Slot tokens joined with spaces
    pub fn slot_string(&self) -> String {
        self.slot_ranges.join(" ")
    }

    /// Parsed slot ownership, migration markers skipped
    pub fn slot_spans(&self) -> impl Iterator<Item = SlotSpan> + '_ {
        self.slot_ranges.iter().filter_map(|t| SlotSpan::parse(t))
    }
}

/// Inclusive range of owned hash slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSpan {
    pub start: u16,
    pub end: u16,
}

impl SlotSpan {
    /// Parse `N` or `A-B`; returns `None` for migration markers and junk
    pub fn parse(token: &str) -> Option<Self> {
        if token.starts_with('[') {
            return None;
        }
        let (start, end) = match token.split_once('-') {
            Some((a, b)) => (a.parse::<u16>().ok()?, b.parse::<u16>().ok()?),
            None => {
                let slot = token.parse::<u16>().ok()?;
                (slot, slot)
            }
        };
        if start > end || end >= TOTAL_SLOTS {
            return None;
        }
        Some(Self { start, end })
    }

    pub fn count(&self) -> usize {
        (self.end - self.start) as usize + 1
    }
}

/// Master entry with one of its replicas (or none)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterReplicaLink {
    pub master_id: String,
    /// Empty when the master is not in the snapshot
    pub master_addr: String,
    /// Empty for masters without replicas
    pub replica_addr: String,
    pub replica_id: String,
    pub slots: String,
}
