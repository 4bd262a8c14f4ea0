//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! command line (cli.rs) ──┐
//! config file (TOML)      ├→ SeedConfig (flags override file values)
//!     → loader.rs ────────┘
//!     → validation.rs (semantic checks, warnings)
//!     → ValidatedConfig (immutable, handed to the supervisor)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once validated; no reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod cli;
pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{ApiConfig, MaintenanceConfig, NodeConfig, ObservabilityConfig, SeedConfig};
pub use validation::{validate_config, ValidatedConfig, ValidationError};
