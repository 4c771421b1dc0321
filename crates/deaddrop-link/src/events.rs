//! Host-facing event callbacks.
//!
//! Everything a link reports crosses this boundary: received content,
//! per-handle package status after a post, and link lifecycle changes.
//! The host (plugin SDK, test harness) implements [`TransportEvents`].

use parking_lot::Mutex;
use std::time::Duration;

/// Opaque completion handle supplied by the host with each action.
pub type Handle = u64;

/// Outcome of a post action, reported once per handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageStatus {
    /// The content was stored and is exposed to the remote peer.
    Sent,
    /// The post failed: retries exhausted or caller contract violated.
    FailedGeneric,
}

/// Link lifecycle transitions reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// A fresh link was created locally; its address can be advertised.
    Created,
    /// A link was loaded from a remotely-advertised address.
    Loaded,
    /// The link is gone (destroyed, or creation failed).
    Destroyed,
}

/// Describes content delivered by a fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDescriptor {
    /// The link the content arrived on.
    pub link_id: String,
    /// MIME-style content type; links deliver `*/*`.
    pub content_type: String,
    /// Whether the content still requires host-side decoding.
    pub encode: bool,
}

impl ContentDescriptor {
    /// The wildcard descriptor links tag every delivery with.
    pub fn wildcard(link_id: impl Into<String>) -> Self {
        Self {
            link_id: link_id.into(),
            content_type: "*/*".to_string(),
            encode: false,
        }
    }
}

/// Callbacks from the transport into its host.
///
/// Implementations must be cheap and non-blocking; they are invoked from
/// link worker tasks.
pub trait TransportEvents: Send + Sync {
    /// Content was retrieved on `link_id`. Invoked exactly once per
    /// successful fetch.
    fn on_receive(&self, link_id: &str, descriptor: &ContentDescriptor, content: &[u8]);

    /// A post action resolved for `handle`. Invoked once per handle per
    /// completed post, or immediately when a post is rejected outright.
    fn on_package_status_changed(&self, handle: Handle, status: PackageStatus);

    /// A link changed lifecycle state.
    fn on_link_status_changed(&self, handle: Handle, link_id: &str, status: LinkStatus);
}

/// Event sink that records everything, for tests and harnesses.
#[derive(Default)]
pub struct RecordingEvents {
    receives: Mutex<Vec<(String, Vec<u8>)>>,
    statuses: Mutex<Vec<(Handle, PackageStatus)>>,
    link_statuses: Mutex<Vec<(Handle, String, LinkStatus)>>,
}

impl RecordingEvents {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All `(link_id, content)` deliveries so far.
    pub fn receives(&self) -> Vec<(String, Vec<u8>)> {
        self.receives.lock().clone()
    }

    /// All `(handle, status)` package reports so far.
    pub fn statuses(&self) -> Vec<(Handle, PackageStatus)> {
        self.statuses.lock().clone()
    }

    /// All `(handle, link_id, status)` link reports so far.
    pub fn link_statuses(&self) -> Vec<(Handle, String, LinkStatus)> {
        self.link_statuses.lock().clone()
    }

    /// Poll until at least `n` package statuses have been reported.
    /// Callers bound this with `tokio::time::timeout`.
    pub async fn wait_for_statuses(&self, n: usize) -> Vec<(Handle, PackageStatus)> {
        loop {
            let statuses = self.statuses();
            if statuses.len() >= n {
                return statuses;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Poll until at least `n` deliveries have been recorded.
    /// Callers bound this with `tokio::time::timeout`.
    pub async fn wait_for_receives(&self, n: usize) -> Vec<(String, Vec<u8>)> {
        loop {
            let receives = self.receives();
            if receives.len() >= n {
                return receives;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl TransportEvents for RecordingEvents {
    fn on_receive(&self, link_id: &str, _descriptor: &ContentDescriptor, content: &[u8]) {
        self.receives
            .lock()
            .push((link_id.to_string(), content.to_vec()));
    }

    fn on_package_status_changed(&self, handle: Handle, status: PackageStatus) {
        self.statuses.lock().push((handle, status));
    }

    fn on_link_status_changed(&self, handle: Handle, link_id: &str, status: LinkStatus) {
        self.link_statuses
            .lock()
            .push((handle, link_id.to_string(), status));
    }
}
