//! Error types for link operations.

use thiserror::Error;

/// Result type alias for link operations.
pub type LinkResult<T> = Result<T, LinkError>;

/// Error variants for link operations.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The link's action queue is at capacity; the caller should reschedule.
    #[error("action queue full for link {link_id}")]
    QueueFull {
        /// The link whose queue rejected the action.
        link_id: String,
    },

    /// The link has been shut down and accepts no further operations.
    #[error("link has been shut down: {link_id}")]
    LinkShutdown {
        /// The link that was addressed.
        link_id: String,
    },

    /// The link address violates a structural invariant.
    #[error("invalid link address: {reason}")]
    InvalidAddress {
        /// Which invariant was violated.
        reason: String,
    },

    /// The link address could not be parsed from JSON.
    #[error("malformed link address: {0}")]
    AddressJson(#[from] serde_json::Error),

    /// A storage operation failed while setting the link up.
    #[error(transparent)]
    Storage(#[from] deaddrop_storage::StorageError),
}
