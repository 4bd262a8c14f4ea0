//! Routing-table maintenance subsystem.
//!
//! # Data Flow
//! ```text
//! periodic.rs: run_periodic(name, interval, token, action)
//!     ├── table-refresh       every 10 s  → refresh stale entries, check replacement cache
//!     ├── connection-rebuild  every 10 min → rebuild connections at full search depth
//!     └── static-peers        every 1 min  → add configured peers missing from the table
//! ```
//!
//! # Design Decisions
//! - Loops are independent: no cross-loop locking or ordering
//! - Failures are warnings and never end a loop; only cancellation does
//! - The static-peers loop exists only when static peers are configured

pub mod loops;
pub mod periodic;

use thiserror::Error;

use crate::discovery::DiscoveryError;

pub use loops::MaintenanceSchedule;
pub use periodic::run_periodic;

/// Error raised by one maintenance iteration.
#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Discovery(DiscoveryError),
}

impl From<DiscoveryError> for MaintenanceError {
    fn from(e: DiscoveryError) -> Self {
        match e {
            DiscoveryError::Cancelled => MaintenanceError::Cancelled,
            other => MaintenanceError::Discovery(other),
        }
    }
}
