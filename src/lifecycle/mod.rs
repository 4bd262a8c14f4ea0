//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (supervisor.rs → startup.rs):
//!     Validate config → Build identity, table, transport → ensure_running
//!     → Bind discovery protocol → Launch task group
//!
//! Shutdown (shutdown.rs):
//!     Cancel token once → Group drains → One bounded transport stop → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger shutdown
//!     Second signal  → Forced exit
//! ```
//!
//! # Design Decisions
//! - One cancellation token for the whole process
//! - Ordered startup: config first, then transport, then everything that depends on it
//! - Shutdown has a deadline: the transport stop never blocks past its timeout

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod supervisor;

pub use shutdown::{Shutdown, ShutdownCoordinator};
pub use supervisor::{Components, Phase, Service, TaskGroup};
