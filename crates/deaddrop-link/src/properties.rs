//! Advertised link properties.
//!
//! These estimates describe what a dead-drop link can plausibly deliver
//! and are handed to the host when a link is created or loaded. The
//! constants reflect measured behavior of polled object storage: seconds
//! of latency, modest bandwidth, unreliable by construction.

use serde::{Deserialize, Serialize};

/// One bandwidth/latency/loss estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkEstimate {
    /// Sustainable bandwidth in bits per second.
    pub bandwidth_bps: u64,
    /// End-to-end latency in milliseconds.
    pub latency_ms: u64,
    /// Expected loss fraction.
    pub loss: f64,
}

/// Properties advertised for one link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkProperties {
    /// Links are store-and-forward and never acknowledge delivery.
    pub reliable: bool,
    /// Maximum content size per post, in bytes. Zero means unspecified.
    pub mtu: usize,
    /// Pessimistic estimate.
    pub worst: LinkEstimate,
    /// Typical estimate.
    pub expected: LinkEstimate,
    /// Optimistic estimate.
    pub best: LinkEstimate,
    /// Serialized advertised address, once known.
    pub link_address: Option<String>,
}

impl Default for LinkProperties {
    fn default() -> Self {
        Self {
            reliable: false,
            mtu: 0,
            worst: LinkEstimate {
                bandwidth_bps: 277_200,
                latency_ms: 3_190,
                loss: 0.1,
            },
            expected: LinkEstimate {
                bandwidth_bps: 308_000,
                latency_ms: 2_900,
                loss: 0.1,
            },
            best: LinkEstimate {
                bandwidth_bps: 338_800,
                latency_ms: 2_610,
                loss: 0.1,
            },
            link_address: None,
        }
    }
}
