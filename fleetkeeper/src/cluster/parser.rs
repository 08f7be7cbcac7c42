//! Peer-list report parser
//!
//! Turns the text of a `CLUSTER NODES` reply into [`ClusterNode`] records.
//! The whole report is rejected on the first malformed line.

use super::types::{ClusterNode, LinkState, NodeFlag};
use crate::core::{NodeField, ParseError};

const UNKNOWN_ADDRESS: &str = "<unknown>";

/// Parse a peer-list report, one node per line, preserving line order
pub fn parse_nodes(report: &str) -> Result<Vec<ClusterNode>, ParseError> {
    let report = report.trim_end_matches(['\n', '\r']);

    let mut nodes = Vec::new();
    for (idx, line) in report.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        nodes.push(parse_line(idx + 1, line)?);
    }
    Ok(nodes)
}

/// Parse a single report line (`line_no` is 1-based, used in errors)
pub fn parse_line(line_no: usize, line: &str) -> Result<ClusterNode, ParseError> {
    let fields: Vec<&str> = line.split_whitespace().collect();

    let raw_address = fields.get(1).copied().unwrap_or("");
    let (address, bus_port, hostname) = split_address(raw_address);
    let address_for_errors = if address.is_empty() {
        UNKNOWN_ADDRESS.to_string()
    } else {
        address.to_string()
    };

    let error = |field: NodeField, value: &str, reason: String| ParseError {
        line: line_no,
        address: address_for_errors.clone(),
        field,
        value: value.to_string(),
        reason,
    };

    if fields.len() < NodeField::FIXED.len() {
        let missing = NodeField::FIXED[fields.len()];
        return Err(error(
            missing,
            "",
            format!(
                "expected at least {} fields, found {}",
                NodeField::FIXED.len(),
                fields.len()
            ),
        ));
    }

    let bus_port = match bus_port {
        Some(port) => Some(
            port.parse::<u16>()
                .map_err(|e| error(NodeField::BusPort, port, e.to_string()))?,
        ),
        None => None,
    };

    let number = |field: NodeField, value: &str| {
        value
            .parse::<u64>()
            .map_err(|e| error(field, value, e.to_string()))
    };

    let flags = fields[2]
        .split(',')
        .filter(|f| !f.is_empty())
        .map(NodeFlag::parse)
        .collect::<Vec<_>>();
    if flags.is_empty() {
        return Err(error(NodeField::Flags, fields[2], "no flags".to_string()));
    }

    let link_state = LinkState::parse(fields[7]).ok_or_else(|| {
        error(
            NodeField::LinkState,
            fields[7],
            "expected connected or disconnected".to_string(),
        )
    })?;

    Ok(ClusterNode {
        id: fields[0].to_string(),
        address: address.to_string(),
        bus_port,
        hostname: hostname.map(str::to_string),
        flags,
        master_id: fields[3].to_string(),
        ping_sent_at: number(NodeField::PingSent, fields[4])?,
        pong_recv_at: number(NodeField::PongRecv, fields[5])?,
        config_epoch: number(NodeField::ConfigEpoch, fields[6])?,
        link_state,
        slot_ranges: fields[8..].iter().map(|s| s.to_string()).collect(),
    })
}

/// Split `host:port[@bus[,hostname]]`
fn split_address(raw: &str) -> (&str, Option<&str>, Option<&str>) {
    let (endpoint, hostname) = match raw.split_once(',') {
        Some((endpoint, host)) if !host.is_empty() => (endpoint, Some(host)),
        Some((endpoint, _)) => (endpoint, None),
        None => (raw, None),
    };
    match endpoint.split_once('@') {
        Some((addr, bus)) => (addr, Some(bus), hostname),
        None => (endpoint, None, hostname),
    }
}
