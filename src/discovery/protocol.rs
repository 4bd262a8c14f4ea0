//! Discovery protocol binding.
//!
//! # Responsibilities
//! - Refresh stale routing-table entries and evict dead ones
//! - Promote replacement-cache candidates that answer a ping
//! - Walk the network with `FindNode` rounds to rebuild connections
//! - Add configured peers on request
//! - Answer inbound `Ping` and `FindNode`

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use async_trait::async_trait;
use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use rand::seq::SliceRandom;
use tokio_util::sync::CancellationToken;

use crate::discovery::table::{RoutingTable, StaticPeer};
use crate::discovery::DiscoveryError;
use crate::network::{InboundHandler, Message, PeerRecord, Transport};

/// Consecutive failed contacts before an entry is evicted.
pub const MAX_FAILURES: u32 = 3;

/// Lookup rounds performed by a full connection rebuild.
pub const DEFAULT_SEARCH_DEPTH: usize = 8;

/// Maximum peers returned in one `Neighbours` reply.
pub const NEIGHBOURS_LIMIT: usize = 16;

/// Outbound requests in flight at once during a refresh, cache check or add.
pub const MAX_CONCURRENT_REQUESTS: usize = 16;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Operations the maintenance loops drive.
#[async_trait]
pub trait DiscoveryProtocol: Send + Sync {
    /// Re-contact entries not seen within `staleness_threshold`.
    async fn refresh_table(
        &self,
        staleness_threshold: Duration,
        token: &CancellationToken,
    ) -> Result<(), DiscoveryError>;

    /// Validate queued candidates and promote responders.
    async fn check_replacement_cache(&self, token: &CancellationToken) -> Result<(), DiscoveryError>;

    /// Re-walk the network up to `max_depth` lookup rounds.
    async fn rebuild_connections(
        &self,
        max_depth: usize,
        token: &CancellationToken,
    ) -> Result<(), DiscoveryError>;

    /// Contact each peer, bounded per peer by `per_peer_timeout`. Returns how many were added.
    async fn add_peers(
        &self,
        peers: &[StaticPeer],
        per_peer_timeout: Duration,
        token: &CancellationToken,
    ) -> Result<usize, DiscoveryError>;

    /// Full search depth of this protocol.
    fn max_depth(&self) -> usize;
}

/// Ping/lookup discovery over any [`Transport`].
pub struct PingDiscovery {
    table: RoutingTable,
    transport: Arc<dyn Transport>,
    address: Address,
    protocol_version: String,
    broadcast_target: usize,
    search_depth: usize,
}

impl PingDiscovery {
    /// Bind the protocol to the running transport and the routing table.
    pub fn bind(
        table: RoutingTable,
        transport: Arc<dyn Transport>,
        address: Address,
        protocol_version: String,
        broadcast_target: usize,
    ) -> Arc<Self> {
        let protocol = Arc::new(Self {
            table,
            transport: transport.clone(),
            address,
            protocol_version,
            broadcast_target: broadcast_target.max(1),
            search_depth: DEFAULT_SEARCH_DEPTH,
        });
        transport.bind_handler(protocol.clone());
        tracing::info!(address = %address, "Discovery protocol bound");
        protocol
    }

    async fn ping(
        &self,
        endpoint: &str,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<PeerRecord, DiscoveryError> {
        let ping = Message::Ping {
            from: self.address,
            endpoint: self.transport.local_endpoint(),
            version: self.protocol_version.clone(),
        };
        match self.transport.request(endpoint, ping, timeout, token).await? {
            Message::Pong { from, endpoint } => Ok(PeerRecord { address: from, endpoint }),
            other => Err(DiscoveryError::UnexpectedReply(other.kind())),
        }
    }

    async fn find_node(
        &self,
        endpoint: &str,
        token: &CancellationToken,
    ) -> Result<Vec<PeerRecord>, DiscoveryError> {
        let find = Message::FindNode {
            from: self.address,
            target: self.address,
        };
        match self.transport.request(endpoint, find, REQUEST_TIMEOUT, token).await? {
            Message::Neighbours { peers } => Ok(peers),
            other => Err(DiscoveryError::UnexpectedReply(other.kind())),
        }
    }

    fn record_failure(&self, address: &Address, error: &DiscoveryError) {
        let failures = self.table.record_failure(address);
        tracing::debug!(peer = %address, failures, error = %error, "Peer contact failed");
        if failures >= MAX_FAILURES && self.table.remove(address).is_some() {
            tracing::info!(peer = %address, failures, "Evicted unresponsive peer");
        }
    }

    fn ensure_live(token: &CancellationToken) -> Result<(), DiscoveryError> {
        if token.is_cancelled() {
            Err(DiscoveryError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DiscoveryProtocol for PingDiscovery {
    async fn refresh_table(
        &self,
        staleness_threshold: Duration,
        token: &CancellationToken,
    ) -> Result<(), DiscoveryError> {
        let stale = self.table.stale_entries(staleness_threshold);
        if stale.is_empty() {
            return Ok(());
        }
        tracing::debug!(count = stale.len(), "Refreshing stale peers");

        let results: Vec<_> = stream::iter(
            stale
                .iter()
                .map(|entry| self.ping(&entry.endpoint, REQUEST_TIMEOUT, token))
                .collect::<Vec<_>>(),
        )
        .buffered(MAX_CONCURRENT_REQUESTS)
        .collect()
        .await;
        Self::ensure_live(token)?;

        for (entry, result) in stale.iter().zip(results) {
            match result {
                Ok(reply) if reply.address == entry.address => self.table.touch(&entry.address),
                Ok(reply) => {
                    let err = DiscoveryError::UnexpectedReply("pong from a different address");
                    tracing::debug!(expected = %entry.address, got = %reply.address, "Peer identity changed");
                    self.record_failure(&entry.address, &err);
                }
                Err(e) => self.record_failure(&entry.address, &e),
            }
        }
        Ok(())
    }

    async fn check_replacement_cache(&self, token: &CancellationToken) -> Result<(), DiscoveryError> {
        if self.table.is_full() {
            return Ok(());
        }
        let candidates = self.table.take_candidates();
        if candidates.is_empty() {
            return Ok(());
        }

        let results: Vec<_> = stream::iter(
            candidates
                .iter()
                .map(|(_, endpoint)| self.ping(endpoint, REQUEST_TIMEOUT, token))
                .collect::<Vec<_>>(),
        )
        .buffered(MAX_CONCURRENT_REQUESTS)
        .collect()
        .await;
        Self::ensure_live(token)?;

        let mut promoted = 0usize;
        for ((address, _), result) in candidates.iter().zip(results) {
            match result {
                Ok(reply) if reply.address == *address => {
                    if self.table.insert_or_touch(reply.address, &reply.endpoint) {
                        promoted += 1;
                    }
                }
                Ok(_) => tracing::debug!(candidate = %address, "Candidate answered with another identity"),
                Err(e) => tracing::trace!(candidate = %address, error = %e, "Candidate unreachable"),
            }
        }
        if promoted > 0 {
            tracing::info!(promoted, checked = candidates.len(), "Promoted replacement candidates");
        }
        Ok(())
    }

    async fn rebuild_connections(
        &self,
        max_depth: usize,
        token: &CancellationToken,
    ) -> Result<(), DiscoveryError> {
        let mut queried: HashSet<Address> = HashSet::new();

        for round in 0..max_depth {
            Self::ensure_live(token)?;

            let mut pool: Vec<_> = self
                .table
                .snapshot()
                .into_iter()
                .filter(|e| !queried.contains(&e.address))
                .collect();
            if pool.is_empty() {
                break;
            }
            pool.shuffle(&mut rand::thread_rng());
            pool.truncate(self.broadcast_target);

            let results = join_all(pool.iter().map(|e| self.find_node(&e.endpoint, token))).await;
            Self::ensure_live(token)?;

            let mut offered = 0usize;
            for (entry, result) in pool.iter().zip(results) {
                queried.insert(entry.address);
                match result {
                    Ok(peers) => {
                        self.table.touch(&entry.address);
                        for peer in peers.into_iter().filter(|p| p.address != self.address) {
                            if self.table.offer_candidate(peer.address, &peer.endpoint) {
                                offered += 1;
                            }
                        }
                    }
                    Err(e) => self.record_failure(&entry.address, &e),
                }
            }

            tracing::debug!(round, queried = pool.len(), offered, "Lookup round finished");
            self.check_replacement_cache(token).await?;
        }
        Ok(())
    }

    async fn add_peers(
        &self,
        peers: &[StaticPeer],
        per_peer_timeout: Duration,
        token: &CancellationToken,
    ) -> Result<usize, DiscoveryError> {
        if peers.is_empty() {
            return Ok(0);
        }

        let results: Vec<_> = stream::iter(
            peers
                .iter()
                .map(|peer| self.ping(&peer.endpoint, per_peer_timeout, token))
                .collect::<Vec<_>>(),
        )
        .buffered(MAX_CONCURRENT_REQUESTS)
        .collect()
        .await;
        Self::ensure_live(token)?;

        let mut added = 0usize;
        for (peer, result) in peers.iter().zip(results) {
            match result {
                Ok(reply) if reply.address == peer.address => {
                    self.table.insert_or_touch(peer.address, &reply.endpoint);
                    if self.table.contains(&peer.address) {
                        added += 1;
                    } else {
                        tracing::debug!(peer = %peer, "Routing table full, static peer queued as candidate");
                    }
                }
                Ok(reply) => tracing::warn!(
                    peer = %peer,
                    answered_as = %reply.address,
                    "Static peer answered with a different address"
                ),
                Err(e) => tracing::debug!(peer = %peer, error = %e, "Static peer unreachable"),
            }
        }

        if added == 0 {
            return Err(DiscoveryError::AllPeersFailed(peers.len()));
        }
        Ok(added)
    }

    fn max_depth(&self) -> usize {
        self.search_depth
    }
}

#[async_trait]
impl InboundHandler for PingDiscovery {
    async fn handle(&self, message: Message, remote: SocketAddr) -> Option<Message> {
        match message {
            Message::Ping { version, .. } if version != self.protocol_version => Some(Message::Error {
                reason: format!("protocol version mismatch: {}", version),
            }),
            Message::Ping { from, endpoint, .. } => {
                if from != self.address {
                    self.table.insert_or_touch(from, &endpoint);
                }
                Some(Message::Pong {
                    from: self.address,
                    endpoint: self.transport.local_endpoint(),
                })
            }
            Message::FindNode { from, target } => {
                self.table.touch(&from);
                let peers = self
                    .table
                    .closest(&target, NEIGHBOURS_LIMIT + 1)
                    .into_iter()
                    .filter(|e| e.address != from)
                    .take(NEIGHBOURS_LIMIT)
                    .map(|e| PeerRecord {
                        address: e.address,
                        endpoint: e.endpoint,
                    })
                    .collect();
                Some(Message::Neighbours { peers })
            }
            other => {
                tracing::debug!(remote = %remote, kind = other.kind(), "Unsolicited message");
                Some(Message::Error {
                    reason: format!("unexpected {}", other.kind()),
                })
            }
        }
    }
}
