//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the seed node.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the seed node.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct SeedConfig {
    /// Node identity, transport and peer settings.
    pub node: NodeConfig,

    /// Maintenance loop cadence and timeouts.
    pub maintenance: MaintenanceConfig,

    /// Read-only query API.
    pub api: ApiConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Node and transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct NodeConfig {
    /// Transport kind: "direct" or "relay-assisted".
    pub transport_kind: String,

    /// Publicly reachable host. Takes precedence over relay servers.
    pub host: Option<String>,

    /// Listen port.
    pub port: u16,

    /// Relay servers (`host:port`) used when no host is set.
    pub relay_servers: Vec<String>,

    /// Maximum concurrently served inbound connections.
    pub worker_count: usize,

    /// Peers queried per lookup round when rebuilding connections.
    pub minimum_broadcast_target: usize,

    /// Bootstrap peers written as `<0x-address>@<host>:<port>`.
    pub static_peers: Vec<String>,

    /// Protocol version token exchanged in pings.
    pub protocol_version: String,

    /// Hex private key. A fresh key is generated when absent.
    pub node_key: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            transport_kind: "direct".to_string(),
            host: None,
            port: 30303,
            relay_servers: Vec::new(),
            worker_count: 64,
            minimum_broadcast_target: 4,
            static_peers: Vec::new(),
            protocol_version: "seed/1".to_string(),
            node_key: None,
        }
    }
}

/// Maintenance loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Table refresh cadence in seconds.
    pub refresh_interval_secs: u64,

    /// Entries older than this are refreshed, in seconds.
    pub staleness_threshold_secs: u64,

    /// Connection rebuild cadence in seconds.
    pub rebuild_interval_secs: u64,

    /// Static peer reconciliation cadence in seconds.
    pub static_peers_interval_secs: u64,

    /// Per-peer timeout when adding static peers, in seconds.
    pub static_peer_timeout_secs: u64,

    /// Upper bound on the transport stop at shutdown, in seconds.
    pub transport_stop_timeout_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 10,
            staleness_threshold_secs: 60,
            rebuild_interval_secs: 600,
            static_peers_interval_secs: 60,
            static_peer_timeout_secs: 5,
            transport_stop_timeout_secs: 1,
        }
    }
}

impl MaintenanceConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_secs(self.staleness_threshold_secs)
    }

    pub fn rebuild_interval(&self) -> Duration {
        Duration::from_secs(self.rebuild_interval_secs)
    }

    pub fn static_peers_interval(&self) -> Duration {
        Duration::from_secs(self.static_peers_interval_secs)
    }

    pub fn static_peer_timeout(&self) -> Duration {
        Duration::from_secs(self.static_peer_timeout_secs)
    }

    pub fn transport_stop_timeout(&self) -> Duration {
        Duration::from_secs(self.transport_stop_timeout_secs)
    }
}

/// Query API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    /// Serve the query API.
    pub enabled: bool,

    /// Bind address (e.g., "127.0.0.1:8081").
    pub bind_address: String,

    /// Optional bearer token required on every request.
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:8081".to_string(),
            api_key: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maintenance_defaults_as_durations() {
        let maintenance = MaintenanceConfig::default();
        assert_eq!(maintenance.refresh_interval(), Duration::from_secs(10));
        assert_eq!(maintenance.staleness_threshold(), Duration::from_secs(60));
        assert_eq!(maintenance.rebuild_interval(), Duration::from_secs(600));
        assert_eq!(maintenance.static_peers_interval(), Duration::from_secs(60));
        assert_eq!(maintenance.static_peer_timeout(), Duration::from_secs(5));
        assert_eq!(maintenance.transport_stop_timeout(), Duration::from_secs(1));
    }
}
