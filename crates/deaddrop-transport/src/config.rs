//! Transport configuration.
//!
//! Carries the values the operator supplies when the transport starts:
//! which side of the channel this process plays, where the bucket lives,
//! and the shared seed both peers derive their object chains from.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{TransportError, TransportResult};

/// Which side of a dead-drop channel this transport plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportRole {
    /// Anonymous peer; never touches bucket policies.
    PublicUser,
    /// Bucket owner; rotates object grants through the ledger.
    AccountHolder,
}

impl TransportRole {
    /// Canonical string form (`PUBLIC_USER` / `ACCOUNT_HOLDER`).
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportRole::PublicUser => "PUBLIC_USER",
            TransportRole::AccountHolder => "ACCOUNT_HOLDER",
        }
    }

    /// Parse the canonical string form.
    pub fn parse(role: &str) -> TransportResult<Self> {
        match role {
            "PUBLIC_USER" => Ok(TransportRole::PublicUser),
            "ACCOUNT_HOLDER" => Ok(TransportRole::AccountHolder),
            other => Err(TransportError::UnknownRole {
                role: other.to_string(),
            }),
        }
    }
}

/// Configuration for one transport instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Side of the channel this process plays.
    pub role: TransportRole,
    /// Storage-service region the bucket lives in.
    pub region: String,
    /// Bucket both directions of created links run through.
    pub bucket: String,
    /// Shared seed the object-id chains start from.
    pub seed: String,
    /// Canonical id of the storage account; required for account holders.
    pub canonical_id: Option<String>,
    /// Create receive-only links (account holder only).
    pub single_receive: bool,
    /// Maximum simultaneous links.
    pub max_links: usize,
    /// Pre-granted window width for created links.
    pub open_objects: usize,
    /// Post retry budget for created links.
    pub max_tries: u32,
    /// Seconds the post-shutdown cleanup waits before revoking reads and
    /// deleting buckets.
    pub cleanup_delay_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            role: TransportRole::PublicUser,
            region: "us-east-1".to_string(),
            bucket: "deaddrop-bucket".to_string(),
            seed: "seed".to_string(),
            canonical_id: None,
            single_receive: false,
            max_links: 32,
            open_objects: 1,
            max_tries: 120,
            cleanup_delay_secs: 60,
        }
    }
}

impl TransportConfig {
    /// Load from a TOML or JSON file, by extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => {
                let config: TransportConfig = toml::from_str(&contents)?;
                Ok(config)
            }
            "json" => {
                let config: TransportConfig = serde_json::from_str(&contents)?;
                Ok(config)
            }
            _ => anyhow::bail!("Unsupported config file extension: {}", ext),
        }
    }

    /// Check structural requirements.
    pub fn validate(&self) -> TransportResult<()> {
        if self.region.is_empty() || self.bucket.is_empty() {
            return Err(TransportError::InvalidConfig {
                reason: "region and bucket must be non-empty".to_string(),
            });
        }
        if self.seed.is_empty() {
            return Err(TransportError::InvalidConfig {
                reason: "seed must be non-empty".to_string(),
            });
        }
        if self.max_tries == 0 {
            return Err(TransportError::InvalidConfig {
                reason: "max_tries must be at least 1".to_string(),
            });
        }
        if self.role == TransportRole::AccountHolder
            && self.canonical_id.as_deref().unwrap_or("").is_empty()
        {
            return Err(TransportError::InvalidConfig {
                reason: "account holders require the account's canonical id".to_string(),
            });
        }
        Ok(())
    }
}

/// A fresh random seed of `bytes` random bytes, hex encoded. Peers that do
/// not pre-agree on a seed generate one and exchange it with the address.
pub fn random_seed(bytes: usize) -> String {
    use rand::RngCore;
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}
