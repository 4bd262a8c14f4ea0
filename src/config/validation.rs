//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reachability: a host or at least one relay server must be present
//! - Resolve transport kind and static peers into typed values
//! - Collect non-fatal warnings (relay configured but unused)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SeedConfig → Result<ValidatedConfig, Vec<ValidationError>>
//! - Runs before any task is started

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{MaintenanceConfig, SeedConfig};
use crate::discovery::identity::NodeIdentity;
use crate::discovery::table::StaticPeer;
use crate::network::TransportKind;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("either a host or at least one relay server must be configured")]
    Unreachable,

    #[error("unknown transport kind '{0}' (expected 'direct' or 'relay-assisted')")]
    UnknownTransportKind(String),

    #[error("port must be non-zero")]
    InvalidPort,

    #[error("worker count must be at least 1")]
    NoWorkers,

    #[error("maintenance setting '{0}' must be greater than zero")]
    ZeroInterval(&'static str),

    #[error("invalid static peer '{peer}': {reason}")]
    InvalidStaticPeer { peer: String, reason: String },

    #[error("invalid relay server '{0}' (expected host:port)")]
    InvalidRelay(String),

    #[error("invalid node key: {0}")]
    InvalidNodeKey(String),

    #[error("invalid {setting} '{value}' (expected ip:port)")]
    InvalidSocketAddress { setting: &'static str, value: String },
}

/// Configuration that passed validation, with derived values resolved.
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub config: SeedConfig,
    pub transport_kind: TransportKind,
    /// Local socket address the transport binds.
    pub bind_address: String,
    /// Endpoint announced to other peers.
    pub advertised_endpoint: String,
    pub static_peers: Vec<StaticPeer>,
    /// Query API listener, `None` when the API is disabled.
    pub api_bind: Option<SocketAddr>,
    /// Prometheus listener, `None` when metrics are disabled.
    pub metrics_address: Option<SocketAddr>,
    pub warnings: Vec<String>,
}

impl ValidatedConfig {
    pub fn maintenance(&self) -> &MaintenanceConfig {
        &self.config.maintenance
    }
}

/// Validate the configuration and resolve derived values.
pub fn validate_config(config: &SeedConfig) -> Result<ValidatedConfig, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let node = &config.node;

    let transport_kind = match node.transport_kind.parse::<TransportKind>() {
        Ok(kind) => Some(kind),
        Err(_) => {
            errors.push(ValidationError::UnknownTransportKind(node.transport_kind.clone()));
            None
        }
    };

    let host = node.host.as_deref().map(str::trim).filter(|h| !h.is_empty());
    for relay in &node.relay_servers {
        if !is_host_port(relay) {
            errors.push(ValidationError::InvalidRelay(relay.clone()));
        }
    }

    let advertised_endpoint = match (host, node.relay_servers.first()) {
        (None, None) => {
            errors.push(ValidationError::Unreachable);
            None
        }
        (Some(host), relay) => {
            if relay.is_some() {
                warnings.push(format!(
                    "relay servers configured but unused because host '{}' is set",
                    host
                ));
            }
            Some(format!("{}:{}", host, node.port))
        }
        (None, Some(relay)) => Some(relay.clone()),
    };

    if node.port == 0 {
        errors.push(ValidationError::InvalidPort);
    }
    if node.worker_count == 0 {
        errors.push(ValidationError::NoWorkers);
    }

    let m = &config.maintenance;
    for (name, value) in [
        ("refresh_interval_secs", m.refresh_interval_secs),
        ("staleness_threshold_secs", m.staleness_threshold_secs),
        ("rebuild_interval_secs", m.rebuild_interval_secs),
        ("static_peers_interval_secs", m.static_peers_interval_secs),
        ("static_peer_timeout_secs", m.static_peer_timeout_secs),
        ("transport_stop_timeout_secs", m.transport_stop_timeout_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroInterval(name));
        }
    }

    let mut static_peers = Vec::with_capacity(node.static_peers.len());
    for raw in &node.static_peers {
        match raw.parse::<StaticPeer>() {
            Ok(peer) if !static_peers.contains(&peer) => static_peers.push(peer),
            Ok(_) => warnings.push(format!("duplicate static peer '{}' ignored", raw)),
            Err(reason) => errors.push(ValidationError::InvalidStaticPeer {
                peer: raw.clone(),
                reason,
            }),
        }
    }

    if let Some(key) = &node.node_key {
        if let Err(e) = NodeIdentity::from_private_key(key) {
            errors.push(ValidationError::InvalidNodeKey(e.to_string()));
        }
    }

    let api_bind = config
        .api
        .enabled
        .then(|| parse_socket_addr("api.bind_address", &config.api.bind_address, &mut errors))
        .flatten();
    let metrics_address = config
        .observability
        .metrics_enabled
        .then(|| {
            parse_socket_addr(
                "observability.metrics_address",
                &config.observability.metrics_address,
                &mut errors,
            )
        })
        .flatten();

    match (transport_kind, advertised_endpoint) {
        (Some(transport_kind), Some(advertised_endpoint)) if errors.is_empty() => {
            Ok(ValidatedConfig {
                config: config.clone(),
                transport_kind,
                bind_address: format!("0.0.0.0:{}", node.port),
                advertised_endpoint,
                static_peers,
                api_bind,
                metrics_address,
                warnings,
            })
        }
        _ => Err(errors),
    }
}

fn parse_socket_addr(
    setting: &'static str,
    value: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<SocketAddr> {
    match value.trim().parse() {
        Ok(addr) => Some(addr),
        Err(_) => {
            errors.push(ValidationError::InvalidSocketAddress {
                setting,
                value: value.to_string(),
            });
            None
        }
    }
}

/// `host:port` with a non-empty host and numeric port.
pub(crate) fn is_host_port(value: &str) -> bool {
    match value.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266@10.0.0.7:30303";

    fn base() -> SeedConfig {
        let mut config = SeedConfig::default();
        config.node.host = Some("203.0.113.5".into());
        config
    }

    #[test]
    fn test_default_with_host_is_valid() {
        let validated = validate_config(&base()).unwrap();
        assert_eq!(validated.transport_kind, TransportKind::Direct);
        assert_eq!(validated.advertised_endpoint, "203.0.113.5:30303");
        assert_eq!(validated.bind_address, "0.0.0.0:30303");
        assert!(validated.warnings.is_empty());
    }

    #[test]
    fn test_missing_host_and_relay_rejected() {
        let config = SeedConfig::default();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::Unreachable]);
    }

    #[test]
    fn test_blank_host_counts_as_missing() {
        let mut config = SeedConfig::default();
        config.node.host = Some("   ".into());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_host_wins_over_relay_with_warning() {
        let mut config = base();
        config.node.relay_servers = vec!["relay.example.net:4000".into()];
        let validated = validate_config(&config).unwrap();
        assert_eq!(validated.advertised_endpoint, "203.0.113.5:30303");
        assert_eq!(validated.warnings.len(), 1);
        assert!(validated.warnings[0].contains("unused"));
    }

    #[test]
    fn test_relay_only_advertises_relay() {
        let mut config = SeedConfig::default();
        config.node.transport_kind = "relay-assisted".into();
        config.node.relay_servers = vec!["relay.example.net:4000".into()];
        let validated = validate_config(&config).unwrap();
        assert_eq!(validated.transport_kind, TransportKind::RelayAssisted);
        assert_eq!(validated.advertised_endpoint, "relay.example.net:4000");
    }

    #[test]
    fn test_unknown_transport_kind() {
        let mut config = base();
        config.node.transport_kind = "carrier-pigeon".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::UnknownTransportKind("carrier-pigeon".into())]
        );
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = SeedConfig::default();
        config.node.port = 0;
        config.node.worker_count = 0;
        config.maintenance.refresh_interval_secs = 0;
        config.node.static_peers = vec!["not-a-peer".into()];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::ZeroInterval("refresh_interval_secs")));
    }

    #[test]
    fn test_static_peers_parsed_and_deduplicated() {
        let mut config = base();
        config.node.static_peers = vec![PEER.into(), PEER.into()];
        let validated = validate_config(&config).unwrap();
        assert_eq!(validated.static_peers.len(), 1);
        assert_eq!(validated.static_peers[0].endpoint, "10.0.0.7:30303");
        assert_eq!(validated.warnings.len(), 1);
    }

    #[test]
    fn test_invalid_node_key() {
        let mut config = base();
        config.node.node_key = Some("zz".into());
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::InvalidNodeKey(_)));
    }

    #[test]
    fn test_invalid_relay() {
        let mut config = base();
        config.node.relay_servers = vec!["no-port".into()];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors, vec![ValidationError::InvalidRelay("no-port".into())]);
    }

    #[test]
    fn test_listener_addresses_resolved() {
        let mut config = base();
        config.observability.metrics_enabled = true;
        let validated = validate_config(&config).unwrap();
        assert_eq!(validated.api_bind, Some("127.0.0.1:8081".parse().unwrap()));
        assert_eq!(validated.metrics_address, Some("0.0.0.0:9090".parse().unwrap()));

        config.api.enabled = false;
        config.observability.metrics_enabled = false;
        let validated = validate_config(&config).unwrap();
        assert_eq!(validated.api_bind, None);
        assert_eq!(validated.metrics_address, None);
    }

    #[test]
    fn test_bad_api_bind_rejected_only_when_enabled() {
        let mut config = base();
        config.api.bind_address = "localhost".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::InvalidSocketAddress {
                setting: "api.bind_address",
                value: "localhost".into(),
            }]
        );

        config.api.enabled = false;
        assert!(validate_config(&config).is_ok());
    }
}
