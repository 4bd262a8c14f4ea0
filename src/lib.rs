//! Seed node: a bootstrap peer for a peer-to-peer overlay network.
//!
//! The library exposes the supervisor and its collaborators so integration
//! tests and alternative binaries can drive them with their own transports.

pub mod api;
pub mod config;
pub mod discovery;
pub mod error;
pub mod lifecycle;
pub mod maintenance;
pub mod network;
pub mod observability;

pub use config::schema::SeedConfig;
pub use error::{SeedError, SeedResult, TaskError};
pub use lifecycle::Shutdown;
