//! Peer discovery subsystem.
//!
//! # Data Flow
//! ```text
//! identity.rs  → NodeIdentity (key + derived address)
//! table.rs     → RoutingTable (address → endpoint), replacement cache
//! protocol.rs  → DiscoveryProtocol bound to {table, transport, own address}
//!
//! Maintenance loops ──call──▶ DiscoveryProtocol ──requests──▶ Transport
//!                                   │
//!                                   └── inserts / touches / evicts ──▶ RoutingTable
//! Inbound messages ──Transport──▶ DiscoveryProtocol (InboundHandler)
//! ```
//!
//! # Design Decisions
//! - Only the protocol evicts table entries
//! - Every operation that can suspend takes the shared cancellation token

pub mod identity;
pub mod protocol;
pub mod table;

use thiserror::Error;

use crate::network::TransportError;

pub use identity::NodeIdentity;
pub use protocol::{DiscoveryProtocol, PingDiscovery};
pub use table::{PeerEntry, PeerView, RoutingTable, StaticPeer};

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Transport(TransportError),

    #[error("unexpected reply '{0}'")]
    UnexpectedReply(&'static str),

    #[error("none of {0} peers answered")]
    AllPeersFailed(usize),
}

impl From<TransportError> for DiscoveryError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Cancelled => DiscoveryError::Cancelled,
            other => DiscoveryError::Transport(other),
        }
    }
}
