//! Command-line arguments for the `seed-node` binary.

use std::path::PathBuf;

use clap::Parser;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::SeedConfig;

#[derive(Debug, Parser)]
#[command(name = "seed-node")]
#[command(about = "Bootstrap node for the peer-to-peer overlay", long_about = None)]
#[command(version)]
pub struct Cli {
    /// TOML configuration file. Flags below override its values.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Transport kind: direct or relay-assisted.
    #[arg(long = "transport")]
    pub transport_kind: Option<String>,

    /// Publicly reachable host of this node.
    #[arg(long)]
    pub host: Option<String>,

    #[arg(short, long)]
    pub port: Option<u16>,

    /// Relay server (host:port). Repeatable.
    #[arg(long = "relay")]
    pub relay_servers: Vec<String>,

    /// Maximum concurrently served inbound connections.
    #[arg(long = "workers")]
    pub worker_count: Option<usize>,

    /// Peers queried per lookup round.
    #[arg(long = "min-broadcast")]
    pub minimum_broadcast_target: Option<usize>,

    /// Static peer (<address>@<host>:<port>). Repeatable.
    #[arg(long = "static-peer")]
    pub static_peers: Vec<String>,

    #[arg(long)]
    pub protocol_version: Option<String>,

    /// Hex private key; generated when omitted.
    #[arg(long, env = "SEED_NODE_KEY", hide_env_values = true)]
    pub node_key: Option<String>,

    /// Query API bind address.
    #[arg(long)]
    pub api_bind: Option<String>,

    /// Disable the query API.
    #[arg(long)]
    pub no_api: bool,

    #[arg(long)]
    pub log_level: Option<String>,

    #[arg(long)]
    pub json_logs: bool,

    /// Expose Prometheus metrics on this address.
    #[arg(long = "metrics")]
    pub metrics_address: Option<String>,
}

impl Cli {
    /// Build the effective configuration: file (or defaults), then flags.
    pub fn into_config(self) -> Result<SeedConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => SeedConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(self, config: &mut SeedConfig) {
        let node = &mut config.node;
        if let Some(kind) = self.transport_kind {
            node.transport_kind = kind;
        }
        if self.host.is_some() {
            node.host = self.host;
        }
        if let Some(port) = self.port {
            node.port = port;
        }
        if !self.relay_servers.is_empty() {
            node.relay_servers = self.relay_servers;
        }
        if let Some(workers) = self.worker_count {
            node.worker_count = workers;
        }
        if let Some(target) = self.minimum_broadcast_target {
            node.minimum_broadcast_target = target;
        }
        if !self.static_peers.is_empty() {
            node.static_peers = self.static_peers;
        }
        if let Some(version) = self.protocol_version {
            node.protocol_version = version;
        }
        if self.node_key.is_some() {
            node.node_key = self.node_key;
        }

        if let Some(bind) = self.api_bind {
            config.api.bind_address = bind;
        }
        if self.no_api {
            config.api.enabled = false;
        }

        let obs = &mut config.observability;
        if let Some(level) = self.log_level {
            obs.log_level = level;
        }
        if self.json_logs {
            obs.json_logs = true;
        }
        if let Some(addr) = self.metrics_address {
            obs.metrics_enabled = true;
            obs.metrics_address = addr;
        }
    }
}
