//! In-memory cache of break-glass grants with write-through persistence.
//!
//! Grants record that an identity was authorised to perform a permission on a resource
//! at a given time. They are kept in two tables:
//!
//! - Grants observed with API keys (or tokens), keyed by the authentication material.
//! - Grants observed for an identity alone, keyed by the identity.
//!
//! Every change to the tables is written through to an external index, once the
//! [`bootstrap`] loader has restored previously persisted grants and opened the [`WriteGate`].
use std::collections::BTreeMap;

mod bootstrap;
mod cache;
mod conf;
pub mod document;
pub mod errors;
mod gate;
mod snapshot;
pub mod telemetry;


pub use self::bootstrap::bootstrap;
pub use self::bootstrap::BootstrapReport;
pub use self::cache::GrantCache;
pub use self::conf::GrantsConf;
pub use self::gate::WriteGate;

/// Permissions granted on each resource, with the time (seconds since epoch) they were granted.
pub type Resources = BTreeMap<String, BTreeMap<String, i64>>;

/// Grants observed with an API key or bearer token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grant {
    /// Stable identifier of the principal.
    pub identity: String,

    /// Display name of the principal.
    pub user: String,

    /// Provider that issued the credential.
    pub source: String,

    /// Bearer token most recently associated with the credential.
    pub token: String,

    pub resources: Resources,
}

/// Grants observed for an identity without authentication material.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserGrant {
    pub identity: String,
    pub user: String,
    pub source: String,
    pub resources: Resources,
}

impl Grant {
    /// Record a permission granted on a resource, keeping the latest time.
    pub fn record(&mut self, resource: &str, permission: &str, time: i64) {
        record(&mut self.resources, resource, permission, time);
    }
}

impl UserGrant {
    /// Record a permission granted on a resource, keeping the latest time.
    pub fn record(&mut self, resource: &str, permission: &str, time: i64) {
        record(&mut self.resources, resource, permission, time);
    }
}

/// An authorisation observed with an API key or bearer token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiAuthorization {
    pub auth_key: String,
    pub identity: String,
    pub user: String,
    pub source: String,
    pub token: String,
    pub resource: String,
    pub permission: String,
    pub time: i64,
}

/// An authorisation observed for an identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserAuthorization {
    pub identity: String,
    pub user: String,
    pub source: String,
    pub resource: String,
    pub permission: String,
    pub time: i64,
}

/// Look up the time a permission was granted on a resource.
fn granted_at(resources: &Resources, resource: &str, permission: &str) -> Option<i64> {
    resources
        .get(resource)
        .and_then(|permissions| permissions.get(permission))
        .copied()
}

fn record(resources: &mut Resources, resource: &str, permission: &str, time: i64) {
    let recorded = resources
        .entry(resource.to_string())
        .or_default()
        .entry(permission.to_string())
        .or_insert(time);
    if time > *recorded {
        *recorded = time;
    }
}
