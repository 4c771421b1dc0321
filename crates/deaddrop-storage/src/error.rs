//! Error types for the storage subsystem.

use thiserror::Error;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error variants for gateway and ledger operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The named bucket does not exist.
    #[error("bucket not found: {bucket}")]
    BucketNotFound {
        /// The bucket that was addressed.
        bucket: String,
    },

    /// The object is absent (or empty) at the addressed key. On a fetch
    /// path this is the normal "remote hasn't posted yet" condition.
    #[error("object not found: {bucket}/{key}")]
    ObjectNotFound {
        /// The bucket that was addressed.
        bucket: String,
        /// The object key that was addressed.
        key: String,
    },

    /// The storage service rejected or failed the request; retryable.
    #[error("storage service unavailable: {reason}")]
    Unavailable {
        /// Description of the failure.
        reason: String,
    },

    /// A revoke addressed a statement that is not in the policy document.
    /// Indicates window/ledger desynchronization.
    #[error("no policy statement with sid '{sid}' for bucket {bucket}")]
    StatementNotFound {
        /// The bucket whose policy was searched.
        bucket: String,
        /// The statement id that was not found.
        sid: String,
    },

    /// A revoke addressed a resource that is not in the statement.
    /// Indicates window/ledger desynchronization.
    #[error("resource {resource} not present under sid '{sid}'")]
    ResourceNotFound {
        /// The statement id that was searched.
        sid: String,
        /// The resource ARN that was not found.
        resource: String,
    },

    /// Wraps standard I/O errors from gateway implementations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
