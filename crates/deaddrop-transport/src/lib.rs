#![warn(missing_docs)]

//! Deaddrop transport subsystem: composition root for the dead-drop
//! channel.
//!
//! A transport plays one role — account holder or public user — and turns
//! the host's link-lifecycle calls and scheduled actions into work on
//! individual links. Everything below it (windows, chains, ledger,
//! gateway) lives in `deaddrop-link` and `deaddrop-storage`.

pub mod action;
pub mod config;
pub mod error;
pub mod registry;
pub mod transport;

pub use action::{ActionDescriptor, ActionType, TransportAction};
pub use config::{random_seed, TransportConfig, TransportRole};
pub use error::{TransportError, TransportResult};
pub use registry::LinkRegistry;
pub use transport::{SupportedAction, Transport, TransportProperties};

/// Install a console tracing subscriber filtered by `RUST_LOG`. Safe to
/// call more than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let _ = tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init();
}
