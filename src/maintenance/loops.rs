//! The three maintenance loops.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::MaintenanceConfig;
use crate::discovery::{DiscoveryProtocol, RoutingTable, StaticPeer};
use crate::error::TaskError;
use crate::maintenance::periodic::run_periodic;
use crate::maintenance::MaintenanceError;
use crate::observability::metrics;

pub const TABLE_REFRESH: &str = "table-refresh";
pub const CONNECTION_REBUILD: &str = "connection-rebuild";
pub const STATIC_PEERS: &str = "static-peers";

/// Cadence and thresholds for all loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceSchedule {
    pub refresh_interval: Duration,
    pub staleness_threshold: Duration,
    pub rebuild_interval: Duration,
    pub static_peers_interval: Duration,
    pub static_peer_timeout: Duration,
}

impl Default for MaintenanceSchedule {
    fn default() -> Self {
        Self::from(&MaintenanceConfig::default())
    }
}

impl From<&MaintenanceConfig> for MaintenanceSchedule {
    fn from(config: &MaintenanceConfig) -> Self {
        Self {
            refresh_interval: config.refresh_interval(),
            staleness_threshold: config.staleness_threshold(),
            rebuild_interval: config.rebuild_interval(),
            static_peers_interval: config.static_peers_interval(),
            static_peer_timeout: config.static_peer_timeout(),
        }
    }
}

/// Refresh stale entries, then validate the replacement cache.
pub async fn table_refresh(
    protocol: Arc<dyn DiscoveryProtocol>,
    schedule: MaintenanceSchedule,
    token: CancellationToken,
) -> Result<(), TaskError> {
    run_periodic(TABLE_REFRESH, schedule.refresh_interval, token, |token| {
        let protocol = protocol.clone();
        async move {
            protocol
                .refresh_table(schedule.staleness_threshold, &token)
                .await?;
            protocol.check_replacement_cache(&token).await?;
            Ok(())
        }
    })
    .await
}

/// Rebuild connections across the protocol's full search depth.
pub async fn connection_rebuild(
    protocol: Arc<dyn DiscoveryProtocol>,
    schedule: MaintenanceSchedule,
    token: CancellationToken,
) -> Result<(), TaskError> {
    run_periodic(CONNECTION_REBUILD, schedule.rebuild_interval, token, |token| {
        let protocol = protocol.clone();
        async move {
            let depth = protocol.max_depth();
            protocol.rebuild_connections(depth, &token).await?;
            Ok(())
        }
    })
    .await
}

/// Keep every configured static peer in the routing table.
pub async fn static_peer_reconciliation(
    protocol: Arc<dyn DiscoveryProtocol>,
    table: RoutingTable,
    peers: Arc<[StaticPeer]>,
    schedule: MaintenanceSchedule,
    token: CancellationToken,
) -> Result<(), TaskError> {
    run_periodic(STATIC_PEERS, schedule.static_peers_interval, token, |token| {
        let protocol = protocol.clone();
        let table = table.clone();
        let peers = peers.clone();
        async move {
            reconcile_static_peers(
                protocol.as_ref(),
                &table,
                &peers,
                schedule.static_peer_timeout,
                &token,
            )
            .await
            .map(|_| ())
        }
    })
    .await
}

/// Static peers not currently in the routing table, in configured order.
pub fn missing_static_peers(peers: &[StaticPeer], table: &RoutingTable) -> Vec<StaticPeer> {
    peers
        .iter()
        .filter(|p| !table.contains(&p.address))
        .cloned()
        .collect()
}

/// One reconciliation tick. Returns the number of peers that were missing.
///
/// No network call is made when nothing is missing.
pub async fn reconcile_static_peers(
    protocol: &dyn DiscoveryProtocol,
    table: &RoutingTable,
    peers: &[StaticPeer],
    per_peer_timeout: Duration,
    token: &CancellationToken,
) -> Result<usize, MaintenanceError> {
    let missing = missing_static_peers(peers, table);
    metrics::record_static_peers_missing(missing.len());
    if missing.is_empty() {
        return Ok(0);
    }

    tracing::info!(missing = missing.len(), "Re-adding static peers");
    let added = protocol.add_peers(&missing, per_peer_timeout, token).await?;
    tracing::debug!(added, missing = missing.len(), "Static peers reconciled");
    Ok(missing.len())
}
