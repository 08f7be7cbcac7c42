use anyhow::{Context, Result, bail};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use fleetkeeper::cluster::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_FLUSH_TIMEOUT, RELAXED_NODE_TIMEOUT};
use fleetkeeper::monitoring::{check_instance, discover_topology, topology_issues};
use fleetkeeper::notify::{Code, ConsoleNotifier, Notice, Notifier};
use fleetkeeper::{
    ClusterFlushOrchestrator, ClusterTopology, FleetConfigManager, FlushCommand, NodeConnector,
    RedisConnector, SentinelMonitor,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "fleetkeeper-cli")]
#[command(about = "Fleetkeeper CLI - Redis fleet operations", long_about = None)]
struct Args {
    /// Password for every node
    #[arg(short = 'a', long, global = true)]
    password: Option<String>,

    /// Per-node command timeout in milliseconds
    #[arg(long, global = true, default_value_t = DEFAULT_COMMAND_TIMEOUT.as_millis() as u64)]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show master/replica topology of a cluster
    Topology {
        /// Node to read the peer list from
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        addr: Option<String>,

        /// Saved `CLUSTER NODES` output
        #[arg(long)]
        file: Option<PathBuf>,

        /// Print the topology as JSON
        #[arg(long)]
        json: bool,
    },

    /// Read or write a config parameter across a fleet
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Flush every node of a cluster
    Flushall {
        /// Any node of the cluster
        #[arg(long)]
        seed: String,

        /// Renamed flush command
        #[arg(long, default_value = FlushCommand::FLUSHALL)]
        command: String,

        /// Per-node flush budget in seconds
        #[arg(long, default_value_t = DEFAULT_FLUSH_TIMEOUT.as_secs())]
        flush_timeout_secs: u64,

        /// cluster-node-timeout used while 3.x nodes are flushed
        #[arg(long, default_value = RELAXED_NODE_TIMEOUT)]
        relaxed_timeout: String,

        /// Confirm the flush
        #[arg(long)]
        yes: bool,
    },

    /// Sentinel event tools
    Sentinel {
        #[command(subcommand)]
        action: SentinelAction,
    },

    /// Health-check a single instance
    Check {
        #[arg(long)]
        addr: String,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the value every node agrees on
    Get {
        #[arg(long)]
        key: String,

        #[command(flatten)]
        target: Target,
    },

    /// Set a value on every node
    Set {
        #[arg(long)]
        key: String,

        #[arg(long)]
        value: String,

        #[command(flatten)]
        target: Target,
    },
}

#[derive(Subcommand, Debug)]
enum SentinelAction {
    /// Print sentinel events until interrupted
    Watch {
        #[arg(long)]
        addr: String,
    },
}

#[derive(ClapArgs, Debug)]
struct Target {
    /// Explicit node list
    #[arg(long, value_delimiter = ',', conflicts_with = "seed")]
    addrs: Vec<String>,

    /// Cluster node to discover the fleet from
    #[arg(long)]
    seed: Option<String>,

    /// Which discovered nodes to target
    #[arg(long, value_enum, default_value_t = Scope::All)]
    scope: Scope,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Scope {
    Masters,
    Replicas,
    All,
}

struct FleetClient {
    connector: Arc<dyn NodeConnector>,
    password: Option<String>,
    timeout: Duration,
}

impl FleetClient {
    fn new(password: Option<String>, timeout: Duration) -> Self {
        Self {
            connector: Arc::new(RedisConnector::new()),
            password,
            timeout,
        }
    }

    async fn topology(&self, seed: &str) -> Result<ClusterTopology> {
        Ok(discover_topology(
            self.connector.as_ref(),
            &[seed.to_string()],
            self.password.as_deref(),
            self.timeout,
        )
        .await?)
    }

    async fn resolve(&self, target: &Target) -> Result<Vec<String>> {
        if !target.addrs.is_empty() {
            return Ok(target.addrs.clone());
        }
        let Some(seed) = &target.seed else {
            bail!("Either --addrs or --seed is required");
        };
        let topology = self.topology(seed).await?;
        Ok(match target.scope {
            Scope::Masters => topology.master_addresses().to_vec(),
            Scope::Replicas => topology.replica_addresses().to_vec(),
            Scope::All => topology.all_addresses(),
        })
    }

    fn config_manager(&self) -> FleetConfigManager {
        FleetConfigManager::new(self.connector.clone(), self.password.clone())
            .with_timeout(self.timeout)
    }

    async fn cmd_topology(
        &self,
        addr: Option<&str>,
        file: Option<&Path>,
        json: bool,
    ) -> Result<String> {
        let topology = match (addr, file) {
            (_, Some(path)) => {
                let report = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                ClusterTopology::from_report(&report)?
            }
            (Some(addr), None) => self.topology(addr).await?,
            (None, None) => bail!("Either --addr or --file is required"),
        };

        if json {
            return Ok(serde_json::to_string_pretty(&topology)?);
        }
        Ok(render_topology(addr.unwrap_or("snapshot"), &topology))
    }

    async fn cmd_config_get(&self, key: &str, target: &Target) -> Result<String> {
        let addrs = self.resolve(target).await?;
        let value = self.config_manager().get(&addrs, key).await?;
        Ok(format!("{} = \"{}\" ({} nodes)", key.bold(), value, addrs.len()))
    }

    async fn cmd_config_set(&self, key: &str, value: &str, target: &Target) -> Result<String> {
        let addrs = self.resolve(target).await?;
        self.config_manager().set(&addrs, key, value).await?;
        Ok(format!("{} ({} set on {} nodes)", "OK".green(), key, addrs.len()))
    }

    async fn cmd_flushall(
        &self,
        seed: &str,
        command: &str,
        flush_timeout: Duration,
        relaxed_timeout: &str,
    ) -> Result<String> {
        let topology = self.topology(seed).await?;
        let orchestrator =
            ClusterFlushOrchestrator::new(self.connector.clone(), self.password.clone())
                .with_command_timeout(self.timeout)
                .with_flush_timeout(flush_timeout)
                .with_relaxed_timeout(relaxed_timeout);

        let report = orchestrator
            .flush_all(&topology, &FlushCommand::new(command))
            .await?;

        let mut out = Vec::new();
        for node in &report.nodes {
            let mode = if node.asynchronous { "async" } else { "sync" };
            out.push(format!(
                "  {} {} ({}, {})",
                "✓".green(),
                node.addr,
                node.version,
                mode
            ));
        }
        if report.relaxed {
            out.push(format!(
                "cluster-node-timeout relaxed and restored to {}",
                report.original_timeout
            ));
        }
        out.push(format!("{} flushed {} nodes", "OK".green(), report.nodes.len()));
        Ok(out.join("\n"))
    }

    async fn cmd_sentinel_watch(&self, addr: &str) -> Result<String> {
        let monitor = SentinelMonitor::new(
            self.connector.clone(),
            Arc::new(ConsoleNotifier),
            self.password.clone(),
            self.timeout,
        );
        info!("Watching sentinel {} (Ctrl+C to stop)", addr);
        let stop = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        let stats = monitor.run(addr, stop).await?;
        Ok(format!(
            "{} events: {} failovers, {} advisories, {} malformed",
            stats.events, stats.failovers, stats.advisories, stats.malformed
        ))
    }

    async fn cmd_check(&self, addr: &str) -> Result<String> {
        let notice = check_instance(
            self.connector.as_ref(),
            addr,
            self.password.as_deref(),
            self.timeout,
        )
        .await;
        if notice.is_error() {
            bail!("{}", notice.text());
        }
        Ok(notice.text().green().to_string())
    }
}

fn render_topology(label: &str, topology: &ClusterTopology) -> String {
    let mut out = vec![format!(
        "{} masters, {} replicas",
        topology.master_addresses().len(),
        topology.replica_addresses().len()
    )
    .bold()
    .to_string()];

    for link in topology.master_to_replica() {
        let master = if link.master_addr.is_empty() {
            "(missing)".red().to_string()
        } else {
            link.master_addr.cyan().to_string()
        };
        let replica = if link.replica_addr.is_empty() {
            "(no replica)".dimmed().to_string()
        } else {
            link.replica_addr.clone()
        };
        out.push(format!(
            "  {} -> {}  {}",
            master,
            replica,
            link.slots.dimmed()
        ));
    }

    for issue in topology_issues(label, topology) {
        out.push(format!("  {} {}", "!".yellow(), issue));
    }
    out.join("\n")
}

async fn execute(args: &Args) -> Result<String> {
    let client = FleetClient::new(
        args.password.clone(),
        Duration::from_millis(args.timeout_ms),
    );

    match &args.command {
        Command::Topology { addr, file, json } => {
            client
                .cmd_topology(addr.as_deref(), file.as_deref(), *json)
                .await
        }
        Command::Config { action } => match action {
            ConfigAction::Get { key, target } => client.cmd_config_get(key, target).await,
            ConfigAction::Set { key, value, target } => {
                client.cmd_config_set(key, value, target).await
            }
        },
        Command::Flushall {
            seed,
            command,
            flush_timeout_secs,
            relaxed_timeout,
            yes,
        } => {
            if !yes {
                bail!("Refusing to flush {} without --yes", seed);
            }
            client
                .cmd_flushall(
                    seed,
                    command,
                    Duration::from_secs(*flush_timeout_secs),
                    relaxed_timeout,
                )
                .await
        }
        Command::Sentinel { action } => match action {
            SentinelAction::Watch { addr } => client.cmd_sentinel_watch(addr).await,
        },
        Command::Check { addr } => client.cmd_check(addr).await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::new(log_level))
        .with_target(false)
        .init();

    let args = Args::parse();
    let start = Instant::now();

    match execute(&args).await {
        Ok(output) => {
            println!("{}", output);
            println!("{}", format!("({:.2?})", start.elapsed()).dimmed());
            Ok(())
        }
        Err(e) => {
            ConsoleNotifier.notify(&Notice::error(Code::ClusterOperationError, format!("{:#}", e)));
            std::process::exit(1);
        }
    }
}
