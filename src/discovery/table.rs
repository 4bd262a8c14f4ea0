//! Routing table and replacement cache.
//!
//! # Responsibilities
//! - Map peer address → endpoint metadata
//! - Hold candidate peers not yet promoted into the table
//! - Answer membership and staleness queries
//!
//! # Design Decisions
//! - `DashMap` shards give internal concurrency; callers never lock
//! - Cheap-clone handle: every clone observes the same table
//! - Timestamps use `tokio::time::Instant` so paused-clock tests control staleness
//! - Bounded: once `capacity` entries are held, new peers go to the replacement cache

use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy::primitives::Address;
use dashmap::DashMap;
use serde::Serialize;
use tokio::time::Instant;

use crate::config::validation::is_host_port;
use crate::observability::metrics;

/// Maximum number of queued replacement candidates.
pub const REPLACEMENT_CACHE_CAPACITY: usize = 64;

/// Default maximum number of routing table entries.
pub const DEFAULT_TABLE_CAPACITY: usize = 512;

/// A known peer.
#[derive(Debug, Clone)]
pub struct PeerEntry {
    pub address: Address,
    pub endpoint: String,
    pub last_seen: Instant,
    /// Consecutive failed contacts.
    pub failures: u32,
}

/// Serializable view of a peer for the query API.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PeerView {
    pub address: Address,
    pub endpoint: String,
    pub last_seen_secs_ago: u64,
    pub failures: u32,
}

impl From<&PeerEntry> for PeerView {
    fn from(entry: &PeerEntry) -> Self {
        Self {
            address: entry.address,
            endpoint: entry.endpoint.clone(),
            last_seen_secs_ago: entry.last_seen.elapsed().as_secs(),
            failures: entry.failures,
        }
    }
}

/// A pre-configured bootstrap peer, written `<address>@<host>:<port>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StaticPeer {
    pub address: Address,
    pub endpoint: String,
}

impl FromStr for StaticPeer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, endpoint) = s
            .trim()
            .split_once('@')
            .ok_or_else(|| "expected <address>@<host>:<port>".to_string())?;
        let address: Address = address
            .parse()
            .map_err(|e| format!("bad address: {}", e))?;
        if !is_host_port(endpoint) {
            return Err(format!("bad endpoint '{}'", endpoint));
        }
        Ok(Self {
            address,
            endpoint: endpoint.to_string(),
        })
    }
}

impl std::fmt::Display for StaticPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.address, self.endpoint)
    }
}

/// Shared routing table handle.
#[derive(Debug, Clone)]
pub struct RoutingTable {
    entries: Arc<DashMap<Address, PeerEntry>>,
    candidates: Arc<DashMap<Address, String>>,
    /// Serializes admission of new entries so the capacity check holds.
    admission: Arc<Mutex<()>>,
    capacity: usize,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TABLE_CAPACITY)
    }
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            candidates: Arc::new(DashMap::new()),
            admission: Arc::new(Mutex::new(())),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.entries.contains_key(address)
    }

    pub fn get(&self, address: &Address) -> Option<PeerEntry> {
        self.entries.get(address).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a peer or refresh an existing one. Returns true when newly added.
    ///
    /// A new peer arriving at a full table is offered to the replacement cache instead.
    pub fn insert_or_touch(&self, address: Address, endpoint: &str) -> bool {
        if let Some(mut e) = self.entries.get_mut(&address) {
            e.endpoint = endpoint.to_string();
            e.last_seen = Instant::now();
            e.failures = 0;
            return false;
        }

        let _admission = self.admission.lock().unwrap_or_else(|e| e.into_inner());
        if self.contains(&address) {
            self.touch(&address);
            return false;
        }
        if self.is_full() {
            if self.offer_candidate(address, endpoint) {
                metrics::record_table_deferred();
                tracing::trace!(peer = %address, "Routing table full, peer queued as candidate");
            }
            return false;
        }

        self.entries.insert(
            address,
            PeerEntry {
                address,
                endpoint: endpoint.to_string(),
                last_seen: Instant::now(),
                failures: 0,
            },
        );
        self.candidates.remove(&address);
        tracing::debug!(peer = %address, endpoint = %endpoint, "Peer added to routing table");
        metrics::record_table_size(self.entries.len());
        true
    }

    /// Mark a peer as seen now.
    pub fn touch(&self, address: &Address) {
        if let Some(mut e) = self.entries.get_mut(address) {
            e.last_seen = Instant::now();
            e.failures = 0;
        }
    }

    /// Record a failed contact; returns the new consecutive failure count.
    pub fn record_failure(&self, address: &Address) -> u32 {
        match self.entries.get_mut(address) {
            Some(mut e) => {
                e.failures += 1;
                e.failures
            }
            None => 0,
        }
    }

    pub fn remove(&self, address: &Address) -> Option<PeerEntry> {
        let removed = self.entries.remove(address).map(|(_, e)| e);
        if removed.is_some() {
            metrics::record_table_size(self.entries.len());
        }
        removed
    }

    /// Entries not seen within `threshold`.
    pub fn stale_entries(&self, threshold: Duration) -> Vec<PeerEntry> {
        self.entries
            .iter()
            .filter(|e| e.last_seen.elapsed() >= threshold)
            .map(|e| e.value().clone())
            .collect()
    }

    /// All entries, sorted by address.
    pub fn snapshot(&self) -> Vec<PeerEntry> {
        let mut all: Vec<PeerEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.address.cmp(&b.address));
        all
    }

    /// Up to `limit` entries closest to `target` by XOR distance.
    pub fn closest(&self, target: &Address, limit: usize) -> Vec<PeerEntry> {
        let mut all = self.snapshot();
        all.sort_by_key(|e| xor_distance(&e.address, target));
        all.truncate(limit);
        all
    }

    /// Queue a candidate for promotion. Ignored when already known or the cache is full.
    pub fn offer_candidate(&self, address: Address, endpoint: &str) -> bool {
        if self.contains(&address)
            || self.candidates.contains_key(&address)
            || self.candidates.len() >= REPLACEMENT_CACHE_CAPACITY
        {
            return false;
        }
        self.candidates.insert(address, endpoint.to_string());
        true
    }

    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// Drain all queued candidates.
    pub fn take_candidates(&self) -> Vec<(Address, String)> {
        let keys: Vec<Address> = self.candidates.iter().map(|e| *e.key()).collect();
        keys.into_iter()
            .filter_map(|k| self.candidates.remove(&k))
            .collect()
    }
}

fn xor_distance(a: &Address, b: &Address) -> [u8; 20] {
    let mut out = [0u8; 20];
    for (i, (x, y)) in a.as_slice().iter().zip(b.as_slice()).enumerate() {
        out[i] = x ^ y;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::repeat_byte(n)
    }

    #[test]
    fn test_insert_and_contains() {
        let table = RoutingTable::new();
        assert!(table.insert_or_touch(addr(1), "10.0.0.1:30303"));
        assert!(!table.insert_or_touch(addr(1), "10.0.0.2:30303"));
        assert!(table.contains(&addr(1)));
        assert_eq!(table.get(&addr(1)).unwrap().endpoint, "10.0.0.2:30303");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_clones_share_state() {
        let table = RoutingTable::new();
        let view = table.clone();
        table.insert_or_touch(addr(7), "10.0.0.7:1");
        assert!(view.contains(&addr(7)));
    }

    #[test]
    fn test_failures_reset_on_touch() {
        let table = RoutingTable::new();
        table.insert_or_touch(addr(1), "a:1");
        assert_eq!(table.record_failure(&addr(1)), 1);
        assert_eq!(table.record_failure(&addr(1)), 2);
        table.touch(&addr(1));
        assert_eq!(table.get(&addr(1)).unwrap().failures, 0);
        assert_eq!(table.record_failure(&addr(9)), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entries() {
        let table = RoutingTable::new();
        table.insert_or_touch(addr(1), "a:1");
        tokio::time::advance(Duration::from_secs(61)).await;
        table.insert_or_touch(addr(2), "b:1");

        let stale = table.stale_entries(Duration::from_secs(60));
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].address, addr(1));
    }

    #[test]
    fn test_closest_orders_by_xor() {
        let table = RoutingTable::new();
        for n in [0x01, 0x0f, 0xf0] {
            table.insert_or_touch(addr(n), "x:1");
        }
        let closest = table.closest(&addr(0x00), 2);
        assert_eq!(closest[0].address, addr(0x01));
        assert_eq!(closest[1].address, addr(0x0f));
    }

    #[test]
    fn test_replacement_cache() {
        let table = RoutingTable::new();
        table.insert_or_touch(addr(1), "a:1");
        assert!(!table.offer_candidate(addr(1), "a:1"));
        assert!(table.offer_candidate(addr(2), "b:1"));
        assert!(!table.offer_candidate(addr(2), "b:1"));
        assert_eq!(table.candidate_count(), 1);

        let drained = table.take_candidates();
        assert_eq!(drained, vec![(addr(2), "b:1".to_string())]);
        assert_eq!(table.candidate_count(), 0);
    }

    #[test]
    fn test_replacement_cache_is_bounded() {
        let table = RoutingTable::new();
        for n in 0..=255u8 {
            table.offer_candidate(addr(n), "x:1");
        }
        assert_eq!(table.candidate_count(), REPLACEMENT_CACHE_CAPACITY);
    }

    #[test]
    fn test_full_table_defers_to_replacement_cache() {
        let table = RoutingTable::with_capacity(2);
        assert!(table.insert_or_touch(addr(1), "a:1"));
        assert!(table.insert_or_touch(addr(2), "b:1"));
        assert!(table.is_full());

        assert!(!table.insert_or_touch(addr(3), "c:1"));
        assert_eq!(table.len(), 2);
        assert!(!table.contains(&addr(3)));
        assert_eq!(table.take_candidates(), vec![(addr(3), "c:1".to_string())]);

        // Known peers are still refreshed when full.
        assert!(!table.insert_or_touch(addr(1), "a:2"));
        assert_eq!(table.get(&addr(1)).unwrap().endpoint, "a:2");

        table.remove(&addr(2));
        assert!(table.insert_or_touch(addr(3), "c:1"));
    }

    #[test]
    fn test_static_peer_parse() {
        let peer: StaticPeer = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266@seed.example.org:30303"
            .parse()
            .unwrap();
        assert_eq!(peer.endpoint, "seed.example.org:30303");
        assert!("missing-at".parse::<StaticPeer>().is_err());
        assert!("0x1234@host:1".parse::<StaticPeer>().is_err());
        assert!("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266@host".parse::<StaticPeer>().is_err());
    }
}
