#![warn(missing_docs)]

//! Deaddrop storage subsystem: object-storage gateway abstraction and the
//! bucket permission ledger.
//!
//! This crate owns everything that touches the storage service directly:
//! the [`ObjectGateway`] trait links and transports call through, the
//! in-memory gateway used by tests, the serde model of bucket policy
//! documents, and the [`PermissionLedger`] that rotates per-object grants
//! in lock-step with the link windows.

pub mod error;
pub mod gateway;
pub mod ledger;
pub mod policy;

pub use error::{StorageError, StorageResult};
pub use gateway::{GatewayStats, MemoryGateway, ObjectGateway};
pub use ledger::{
    PermissionLedger, PRIVATE_GETTABLE_SID, PRIVATE_PUTTABLE_SID, PUBLIC_GETTABLE_PREFIX,
    PUBLIC_PUTTABLE_PREFIX,
};
pub use policy::{object_arn, Permission, PolicyDocument, PolicyStatement, Principal};
