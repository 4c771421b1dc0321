//! Error types for the transport layer.

use thiserror::Error;

/// Result type alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Error variants for transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The role name is not one of the known transport roles.
    #[error("unknown transport role: {role}")]
    UnknownRole {
        /// The unrecognized role string.
        role: String,
    },

    /// The configuration violates a structural requirement.
    #[error("invalid transport config: {reason}")]
    InvalidConfig {
        /// Which requirement was violated.
        reason: String,
    },

    /// Creating another link would exceed the configured limit.
    #[error("too many links: {current} of {max}")]
    TooManyLinks {
        /// Links currently registered.
        current: usize,
        /// Configured maximum.
        max: usize,
    },

    /// No link is registered under the given id.
    #[error("link with id '{link_id}' does not exist")]
    LinkNotFound {
        /// The id that was looked up.
        link_id: String,
    },

    /// Loading a link from multiple addresses is not supported.
    #[error("multi-address loading is not supported")]
    MultiAddressUnsupported,

    /// The action descriptor JSON could not be parsed.
    #[error("malformed action descriptor: {0}")]
    MalformedAction(#[from] serde_json::Error),

    /// A link-level operation failed.
    #[error(transparent)]
    Link(#[from] deaddrop_link::LinkError),
}
