//! Health checks for instances, sentinels and clusters

use super::info::InfoReport;
use crate::cluster::{ClusterTopology, SlotSpan};
use crate::connection::{self, NodeConnection, NodeConnector};
use crate::core::{ClusterFleet, FleetError, Result};
use crate::notify::{Code, Notice};
use std::time::Duration;
use tracing::{debug, warn};

/// TTL of the key written by the master write check
pub const CANARY_TTL: Duration = Duration::from_secs(30);

fn canary_key() -> String {
    format!("impossible_exist_key@{}", chrono::Utc::now().timestamp())
}

/// Connect, read INFO and read a canary key, writing it first on masters
pub async fn check_instance(
    connector: &dyn NodeConnector,
    addr: &str,
    password: Option<&str>,
    timeout: Duration,
) -> Notice {
    match inspect_instance(connector, addr, password, timeout).await {
        Ok(role) => {
            debug!("Instance {} ({}) is healthy", addr, role);
            Notice::success(format!("instance {} ({}) is healthy", addr, role))
        }
        Err(e) => {
            warn!("Instance {} failed its health check: {}", addr, e);
            Notice::error(Code::MonitorAddrError, e)
        }
    }
}

async fn inspect_instance(
    connector: &dyn NodeConnector,
    addr: &str,
    password: Option<&str>,
    timeout: Duration,
) -> Result<String> {
    let mut conn = connection::open(connector, addr, password, timeout).await?;
    let result = run_checks(&mut *conn, addr, timeout).await;
    conn.close().await;
    result
}

async fn run_checks(conn: &mut dyn NodeConnection, addr: &str, timeout: Duration) -> Result<String> {
    let info = connection::with_timeout(addr, "INFO", timeout, conn.info()).await?;
    let role = InfoReport::parse(&info)
        .role()
        .unwrap_or("unknown")
        .to_string();

    let key = canary_key();
    match role.as_str() {
        "master" => {
            connection::with_timeout(
                addr,
                "SET",
                timeout,
                conn.set_with_ttl(&key, "canary", CANARY_TTL),
            )
            .await?;
            connection::with_timeout(addr, "GET", timeout, conn.get(&key)).await?;
        }
        "slave" => {
            // The key is absent on replicas, only the read path matters
            connection::with_timeout(addr, "GET", timeout, conn.get(&key)).await?;
        }
        _ => {}
    }
    Ok(role)
}

/// Connect and PING
pub async fn check_reachable(
    connector: &dyn NodeConnector,
    addr: &str,
    password: Option<&str>,
    timeout: Duration,
) -> Result<()> {
    let mut conn = connection::open(connector, addr, password, timeout).await?;
    let result = connection::with_timeout(addr, "PING", timeout, conn.ping()).await;
    conn.close().await;
    result
}

/// Sentinel liveness as a notice
pub async fn check_sentinel(
    connector: &dyn NodeConnector,
    addr: &str,
    password: Option<&str>,
    timeout: Duration,
) -> Notice {
    match check_reachable(connector, addr, password, timeout).await {
        Ok(()) => Notice::success(format!("sentinel {} is reachable", addr)),
        Err(e) => Notice::error(Code::MonitorSentinelError, e),
    }
}

async fn fetch_report(
    connector: &dyn NodeConnector,
    addr: &str,
    password: Option<&str>,
    timeout: Duration,
) -> Result<String> {
    let mut conn = connection::open(connector, addr, password, timeout).await?;
    let result =
        connection::with_timeout(addr, "CLUSTER NODES", timeout, conn.cluster_nodes()).await;
    conn.close().await;
    result
}

/// Fetch the topology from the first instance that answers
pub async fn discover_topology(
    connector: &dyn NodeConnector,
    seeds: &[String],
    password: Option<&str>,
    timeout: Duration,
) -> Result<ClusterTopology> {
    let mut last_error = None;
    for addr in seeds {
        match fetch_report(connector, addr, password, timeout).await {
            Ok(report) => return ClusterTopology::from_report(&report),
            Err(e) => {
                warn!("Seed {} did not return a peer list: {}", addr, e);
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| FleetError::EmptyFleet {
        operation: "CLUSTER NODES".to_string(),
    }))
}

fn format_spans(spans: &[SlotSpan]) -> String {
    spans
        .iter()
        .map(|s| {
            if s.start == s.end {
                s.start.to_string()
            } else {
                format!("{}-{}", s.start, s.end)
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Problems visible in one snapshot
pub fn topology_issues(name: &str, topology: &ClusterTopology) -> Vec<String> {
    let mut issues = Vec::new();

    for node in topology.failing_nodes() {
        let flags = node
            .flags
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(",");
        issues.push(format!(
            "cluster {}: node {} ({}) is flagged {}",
            name, node.address, node.id, flags
        ));
    }

    for node in topology
        .nodes()
        .iter()
        .filter(|n| n.link_state == crate::cluster::LinkState::Disconnected && !n.is_myself())
    {
        issues.push(format!(
            "cluster {}: bus link to {} ({}) is disconnected",
            name, node.address, node.id
        ));
    }

    for node in topology.orphaned_replicas() {
        issues.push(format!(
            "cluster {}: replica {} reports unknown master {}",
            name, node.address, node.master_id
        ));
    }

    let gaps = topology.uncovered_slots();
    if !gaps.is_empty() {
        let count: usize = gaps.iter().map(|g| g.count()).sum();
        issues.push(format!(
            "cluster {}: {} slots not covered: {}",
            name,
            count,
            format_spans(&gaps)
        ));
    }

    issues
}

/// Snapshot the cluster, report its problems and PING every node
pub async fn check_cluster(
    connector: &dyn NodeConnector,
    fleet: &ClusterFleet,
    timeout: Duration,
) -> Vec<Notice> {
    let password = fleet.password.as_deref();
    let topology =
        match discover_topology(connector, &fleet.instances, password, timeout).await {
            Ok(topology) => topology,
            Err(e) => {
                return vec![Notice::error(
                    Code::MonitorClusterError,
                    format!("cluster {}: {}", fleet.app_name, e),
                )];
            }
        };

    let mut notices: Vec<Notice> = topology_issues(&fleet.app_name, &topology)
        .into_iter()
        .map(|issue| Notice::error(Code::MonitorClusterError, issue))
        .collect();

    for addr in topology.all_addresses() {
        if let Err(e) = check_reachable(connector, &addr, password, timeout).await {
            notices.push(Notice::error(
                Code::MonitorClusterError,
                format!("cluster {}: {}", fleet.app_name, e),
            ));
        }
    }

    if notices.is_empty() {
        notices.push(Notice::success(format!(
            "cluster {} is healthy ({} masters, {} replicas)",
            fleet.app_name,
            topology.master_addresses().len(),
            topology.replica_addresses().len()
        )));
    }
    notices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::mock::{Call, MockConnector, MockNode};

    const TIMEOUT: Duration = Duration::from_secs(1);
    const SEED: &str = "127.0.0.1:7001";

    fn report(third_master: &str) -> String {
        format!(
            "9a1f0c2d3e4b5a69788796a5b4c3d2e1f0a9b8c7 127.0.0.1:7001@17001 myself,master - 0 0 1 connected 0-5460\n\
             1b2c3d4e5f60718293a4b5c6d7e8f90123456789 127.0.0.1:7002@17002 master - 0 0 2 connected 5461-10922\n\
             2c3d4e5f60718293a4b5c6d7e8f9012345678901 127.0.0.1:7003@17003 {third_master}\n"
        )
    }

    fn cluster(report: &str) -> (MockConnector, ClusterFleet) {
        let connector = MockConnector::new();
        for addr in ["127.0.0.1:7001", "127.0.0.1:7002", "127.0.0.1:7003"] {
            let mut node = MockNode::with_version("7.0.11");
            node.cluster_nodes = report.to_string();
            connector.add(addr, node);
        }
        let fleet = ClusterFleet {
            app_id: 103,
            app_name: "cache".to_string(),
            password: None,
            instances: vec![SEED.to_string()],
        };
        (connector, fleet)
    }

    fn written_keys(connector: &MockConnector) -> Vec<String> {
        connector
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Set(_, key) => Some(key),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_check_instance_master_writes_then_reads() {
        let connector = MockConnector::new();
        connector.add("10.0.0.1:6379", MockNode::with_version("6.2.14"));

        let notice = check_instance(&connector, "10.0.0.1:6379", None, TIMEOUT).await;
        assert_eq!(notice.code, Code::Success);
        assert_eq!(notice.text(), "instance 10.0.0.1:6379 (master) is healthy");

        let keys = written_keys(&connector);
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("impossible_exist_key@"));
        assert!(
            connector
                .calls()
                .contains(&Call::Get("10.0.0.1:6379".to_string(), keys[0].clone()))
        );
        assert_eq!(connector.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_check_instance_replica_only_reads() {
        let connector = MockConnector::new();
        let mut replica = MockNode::with_version("6.2.14");
        replica.role = "slave".to_string();
        connector.add("10.0.0.2:6379", replica);

        let notice = check_instance(&connector, "10.0.0.2:6379", None, TIMEOUT).await;
        assert!(!notice.is_error());
        assert!(notice.text().contains("(slave)"));

        assert!(written_keys(&connector).is_empty());
        assert!(
            connector
                .calls()
                .iter()
                .any(|c| matches!(c, Call::Get(addr, _) if addr == "10.0.0.2:6379"))
        );
    }

    #[tokio::test]
    async fn test_check_instance_names_the_failing_step() {
        let connector = MockConnector::new();
        let mut read_only = MockNode::with_version("6.2.14");
        read_only.fail_set = true;
        connector.add("10.0.0.1:6379", read_only);
        let mut no_info = MockNode::with_version("6.2.14");
        no_info.fail_info = true;
        connector.add("10.0.0.2:6379", no_info);

        let notice = check_instance(&connector, "10.0.0.1:6379", None, TIMEOUT).await;
        assert_eq!(notice.code, Code::MonitorAddrError);
        assert!(notice.is_error());
        assert!(notice.text().contains("SET"));
        assert!(notice.text().contains("10.0.0.1:6379"));

        let notice = check_instance(&connector, "10.0.0.2:6379", None, TIMEOUT).await;
        assert_eq!(notice.code, Code::MonitorAddrError);
        assert!(notice.text().contains("INFO"));
        assert!(notice.text().contains("10.0.0.2:6379"));

        let notice = check_instance(&connector, "10.0.0.3:6379", None, TIMEOUT).await;
        assert_eq!(notice.code, Code::MonitorAddrError);
        assert!(notice.text().contains("connection refused"));
        assert_eq!(connector.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_check_sentinel_unreachable() {
        let connector = MockConnector::new();
        connector.add("10.0.1.10:26379", MockNode::with_version("6.2.14"));

        let notice = check_sentinel(&connector, "10.0.1.10:26379", None, TIMEOUT).await;
        assert!(!notice.is_error());

        let notice = check_sentinel(&connector, "10.0.1.11:26379", None, TIMEOUT).await;
        assert_eq!(notice.code, Code::MonitorSentinelError);
        assert!(notice.text().contains("10.0.1.11:26379"));
    }

    #[tokio::test]
    async fn test_discover_topology_falls_back_to_next_seed() {
        let (connector, _) = cluster(&report("master - 0 0 3 connected 10923-16383"));
        connector.update("127.0.0.1:7001", |n| n.unreachable = true);
        let seeds = vec!["127.0.0.1:7001".to_string(), "127.0.0.1:7002".to_string()];

        let topology = discover_topology(&connector, &seeds, None, TIMEOUT)
            .await
            .unwrap();
        assert_eq!(topology.master_addresses().len(), 3);

        let reports: Vec<_> = connector
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::ClusterNodes(_)))
            .collect();
        assert_eq!(reports, vec![Call::ClusterNodes("127.0.0.1:7002".to_string())]);
    }

    #[tokio::test]
    async fn test_discover_topology_without_answering_seed() {
        let connector = MockConnector::new();
        let seeds = vec!["127.0.0.1:7001".to_string(), "127.0.0.1:7002".to_string()];

        let err = discover_topology(&connector, &seeds, None, TIMEOUT)
            .await
            .unwrap_err();
        assert_eq!(err.addr(), Some("127.0.0.1:7002"));

        assert!(matches!(
            discover_topology(&connector, &[], None, TIMEOUT).await,
            Err(FleetError::EmptyFleet { .. })
        ));
    }

    #[tokio::test]
    async fn test_check_cluster_healthy() {
        let (connector, fleet) = cluster(&report("master - 0 0 3 connected 10923-16383"));

        let notices = check_cluster(&connector, &fleet, TIMEOUT).await;
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].code, Code::Success);
        assert_eq!(notices[0].text(), "cluster cache is healthy (3 masters, 0 replicas)");
        assert_eq!(connector.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_check_cluster_reports_each_problem() {
        let (connector, fleet) =
            cluster(&report("master,fail - 0 0 3 disconnected 10923-16000"));
        connector.update("127.0.0.1:7003", |n| n.unreachable = true);

        let notices = check_cluster(&connector, &fleet, TIMEOUT).await;
        assert_eq!(notices.len(), 4);
        assert!(notices.iter().all(|n| n.code == Code::MonitorClusterError));
        assert!(notices.iter().all(|n| n.text().starts_with("cluster cache")));
        assert!(notices.iter().any(|n| n.text().contains("is flagged")));
        assert!(notices.iter().any(|n| n.text().contains("is disconnected")));
        assert!(
            notices
                .iter()
                .any(|n| n.text().contains("383 slots not covered: 16001-16383"))
        );
        assert!(
            notices
                .iter()
                .any(|n| n.text().contains("127.0.0.1:7003") && n.text().contains("refused"))
        );
    }

    #[tokio::test]
    async fn test_check_cluster_without_topology() {
        let (connector, fleet) = cluster("");
        connector.update(SEED, |n| n.unreachable = true);

        let notices = check_cluster(&connector, &fleet, TIMEOUT).await;
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].code, Code::MonitorClusterError);
        assert!(notices[0].text().starts_with("cluster cache: "));
    }
}
