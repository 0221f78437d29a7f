//! Initialisation logic for break-glass cache processes.
mod metrics;
mod backends;
mod generic;
mod server;
mod services;
mod sync;

pub use self::generic::GenericInit;
pub use self::server::Server;
pub use self::services::Services;
pub use self::sync::Sync;

/// ID of the release in sentry recommended format.
const RELEASE_ID: &str = concat!(env!("CARGO_PKG_NAME"), "@", env!("CARGO_PKG_VERSION"));
