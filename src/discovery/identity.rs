//! Node identity: a private key and the address derived from it.
//!
//! # Security
//! - Keys come from config, `SEED_NODE_KEY`, or are generated per process
//! - Keys are never logged or serialized

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid private key format: {0}")]
pub struct IdentityError(String);

/// Immutable identity of this node for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    signer: PrivateKeySigner,
}

impl NodeIdentity {
    /// Create an identity from a hex-encoded private key (with or without 0x prefix).
    pub fn from_private_key(private_key_hex: &str) -> Result<Self, IdentityError> {
        let key_hex = private_key_hex.trim();
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| IdentityError(format!("{}", e)))?;

        Ok(Self { signer })
    }

    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        Self {
            signer: PrivateKeySigner::random(),
        }
    }

    /// Load from the configured key, or generate one.
    pub fn from_config(node_key: Option<&str>) -> Result<Self, IdentityError> {
        let identity = match node_key {
            Some(key) => Self::from_private_key(key)?,
            None => Self::generate(),
        };
        tracing::info!(address = %identity.address(), "Node identity ready");
        Ok(identity)
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }
}
