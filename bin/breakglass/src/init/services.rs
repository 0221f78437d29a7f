//! Caches built by the server process for request handlers to share.
use std::sync::Arc;

use breakglass_grants::GrantCache;
use breakglass_resauth::ResourceAuthorizer;

/// Handles to the break-glass caches of a running process.
#[derive(Clone)]
pub struct Services {
    /// Break-glass grants, restored from and written through to the index.
    pub grants: Arc<GrantCache>,

    /// Resource authorisation decisions, when a policy service is configured.
    pub resource_auth: Option<Arc<ResourceAuthorizer>>,
}
