//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, worker limit)
//!     → message.rs (decode one JSON line)
//!     → InboundHandler (discovery protocol, once bound)
//!     → reply written on the same connection
//!
//! Outgoing request:
//!     connect → write one message → read one reply → close
//! ```
//!
//! # Design Decisions
//! - Bounded worker slots prevent resource exhaustion
//! - Every outbound exchange has a deadline and honors cancellation
//! - Connections are tracked so the run loop can drain them on stop

pub mod listener;
pub mod message;
pub mod transport;

use std::time::Duration;

use thiserror::Error;

pub use message::{Message, PeerRecord};
pub use transport::{
    InboundHandler, TcpTransport, Transport, TransportKind, TransportSettings, TransportState,
};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind: {0}")]
    Bind(std::io::Error),

    #[error("I/O error: {0}")]
    Io(std::io::Error),

    #[error("malformed message: {0}")]
    Codec(serde_json::Error),

    #[error("message exceeds {0} bytes")]
    FrameTooLarge(usize),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("peer closed the connection without replying")]
    UnexpectedEof,

    #[error("peer rejected request: {0}")]
    Remote(String),

    #[error("transport already started")]
    AlreadyStarted,

    #[error("transport stopped")]
    Stopped,
}
