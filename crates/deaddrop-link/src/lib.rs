#![warn(missing_docs)]

//! Deaddrop link subsystem: the per-link state machine at the heart of the
//! transport.
//!
//! A link is one covert channel between an account holder (who owns the
//! storage buckets and rotates object-level grants) and a public user (who
//! only performs anonymous gets and puts). Both sides walk the same
//! deterministic object-id chain, so after the initial out-of-band address
//! exchange no further coordination is needed.

pub mod address;
pub mod chain;
pub mod error;
pub mod events;
pub mod link;
pub mod properties;
pub mod window;

pub use address::LinkAddress;
pub use chain::{next_object_id, seeded_object_id};
pub use error::{LinkError, LinkResult};
pub use events::{
    ContentDescriptor, Handle, LinkStatus, PackageStatus, RecordingEvents, TransportEvents,
};
pub use link::{
    ActionId, Link, LinkRole, LinkState, ACTION_QUEUE_CAPACITY, DEFAULT_CLEANUP_DELAY,
};
pub use properties::{LinkEstimate, LinkProperties};
pub use window::ObjectWindows;
