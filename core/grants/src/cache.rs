//! Lookup and record grants, writing changes through to the index.
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use anyhow::Result;

use breakglass_context::Context;
use breakglass_crypto::Envelope;
use breakglass_index::Index;

use crate::document::DocumentId;
use crate::document::GrantDocument;
use crate::ApiAuthorization;
use crate::Grant;
use crate::GrantsConf;
use crate::UserAuthorization;
use crate::UserGrant;
use crate::WriteGate;

/// Cache of break-glass grants keyed by authentication material and by identity.
pub struct GrantCache {
    by_auth_key: Mutex<HashMap<String, Grant>>,
    by_identity: Mutex<HashMap<String, UserGrant>>,
    conf: GrantsConf,
    envelope: Arc<Envelope>,
    gate: WriteGate,
    index: Option<Index>,
}

impl GrantCache {
    /// Initialise an empty cache.
    ///
    /// Without an [`Index`] grants are kept in memory only.
    pub fn new(
        conf: GrantsConf,
        envelope: Arc<Envelope>,
        gate: WriteGate,
        index: Option<Index>,
    ) -> GrantCache {
        GrantCache {
            by_auth_key: Mutex::new(HashMap::new()),
            by_identity: Mutex::new(HashMap::new()),
            conf,
            envelope,
            gate,
            index,
        }
    }

    /// Record an authorisation observed with an API key or bearer token.
    ///
    /// Outside of bootstrap, and once the [`WriteGate`] is open, all API key grants
    /// for the identity are submitted to the index.
    /// Persistence errors are logged and never returned.
    pub fn add_authorization(
        &self,
        context: &Context,
        authorization: ApiAuthorization,
        at_bootstrap: bool,
    ) {
        let (identity, document) = {
            let mut table = self
                .by_auth_key
                .lock()
                .expect("GrantCache::by_auth_key lock poisoned");
            let grant = table
                .entry(authorization.auth_key)
                .or_insert_with(|| Grant {
                    identity: String::new(),
                    user: String::new(),
                    source: String::new(),
                    token: String::new(),
                    resources: Default::default(),
                });
            // Replayed grants never replace details of a more recent live authorisation.
            if !at_bootstrap || is_newer(&grant.resources, authorization.time) {
                grant.identity = authorization.identity;
                grant.user = authorization.user;
                grant.source = authorization.source;
                grant.token = authorization.token;
            }
            grant.record(
                &authorization.resource,
                &authorization.permission,
                authorization.time,
            );

            let identity = grant.identity.clone();
            let user = grant.user.clone();
            if !self.should_persist(&identity, at_bootstrap) {
                return;
            }
            let document =
                crate::snapshot::api_key_document(&self.envelope, &table, &identity, &user);
            (identity, document)
        };
        self.persist(context, DocumentId::ApiKey(&identity), document);
    }

    /// Record an authorisation observed for an identity.
    ///
    /// Outside of bootstrap, and once the [`WriteGate`] is open, the identity grants
    /// are submitted to the index.
    /// Persistence errors are logged and never returned.
    pub fn add_user(
        &self,
        context: &Context,
        authorization: UserAuthorization,
        at_bootstrap: bool,
    ) {
        let document = {
            let mut table = self
                .by_identity
                .lock()
                .expect("GrantCache::by_identity lock poisoned");
            let grant = table
                .entry(authorization.identity.clone())
                .or_insert_with(|| UserGrant {
                    identity: authorization.identity.clone(),
                    user: String::new(),
                    source: String::new(),
                    resources: Default::default(),
                });
            if !at_bootstrap || is_newer(&grant.resources, authorization.time) {
                grant.user = authorization.user;
                grant.source = authorization.source;
            }
            grant.record(
                &authorization.resource,
                &authorization.permission,
                authorization.time,
            );

            if !self.should_persist(&grant.identity, at_bootstrap) {
                return;
            }
            crate::snapshot::identity_document(grant)
        };
        self.persist(
            context,
            DocumentId::Identity(&authorization.identity),
            document,
        );
    }

    /// Look up a grant for authentication material, if it is still within the duration limit.
    pub fn get_authorization(
        &self,
        auth_key: &str,
        resource: &str,
        permission: &str,
    ) -> Option<Grant> {
        self.get_authorization_at(auth_key, resource, permission, now())
    }

    /// Look up a grant for authentication material as of the given time (seconds since epoch).
    pub fn get_authorization_at(
        &self,
        auth_key: &str,
        resource: &str,
        permission: &str,
        now: i64,
    ) -> Option<Grant> {
        let table = self
            .by_auth_key
            .lock()
            .expect("GrantCache::by_auth_key lock poisoned");
        let grant = table.get(auth_key)?;
        let time = crate::granted_at(&grant.resources, resource, permission)?;
        if !self.within_limit(time, now) {
            return None;
        }
        Some(grant.clone())
    }

    /// Check if an identity holds a grant from the given source within the duration limit.
    pub fn is_user_authorized(
        &self,
        identity: &str,
        source: &str,
        resource: &str,
        permission: &str,
    ) -> bool {
        self.is_user_authorized_at(identity, source, resource, permission, now())
    }

    /// Check if an identity holds a grant from the given source as of the given time.
    pub fn is_user_authorized_at(
        &self,
        identity: &str,
        source: &str,
        resource: &str,
        permission: &str,
        now: i64,
    ) -> bool {
        let table = self
            .by_identity
            .lock()
            .expect("GrantCache::by_identity lock poisoned");
        let grant = match table.get(identity) {
            Some(grant) if grant.source == source => grant,
            _ => return false,
        };
        crate::granted_at(&grant.resources, resource, permission)
            .map(|time| self.within_limit(time, now))
            .unwrap_or(false)
    }

    /// Configuration the cache was created with.
    pub fn conf(&self) -> &GrantsConf {
        &self.conf
    }

    /// Envelope used to seal and open secrets.
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Gate controlling writes to the index.
    pub fn gate(&self) -> &WriteGate {
        &self.gate
    }

    /// Client to the index grants are persisted to, if one is available.
    pub fn index(&self) -> Option<&Index> {
        self.index.as_ref()
    }

    fn persist(&self, context: &Context, id: DocumentId, document: Result<GrantDocument>) {
        let context = context.derive_with(|builder| builder.identity(id.identity()));
        let context = &context;
        let id = id.to_string();
        let result = document
            .and_then(|document| Ok(serde_json::to_value(document)?))
            .and_then(|document| match &self.index {
                Some(index) => index.bulk_index(context, document, &self.conf.index, &id),
                None => Ok(()),
            });
        match result {
            Ok(()) => crate::telemetry::WRITE_THROUGH.inc(),
            Err(error) => {
                crate::telemetry::PERSIST_ERR.inc();
                slog::error!(
                    context.logger, "Unable to persist grants";
                    "id" => &id,
                    replisdk::utils::error::slog::ErrorAttributes::from(&error),
                );
            }
        }
    }

    fn should_persist(&self, identity: &str, at_bootstrap: bool) -> bool {
        !at_bootstrap && !identity.is_empty() && self.index.is_some() && self.gate.is_open()
    }

    fn within_limit(&self, time: i64, now: i64) -> bool {
        let limit = i64::try_from(self.conf.duration_limit_sec).unwrap_or(i64::MAX);
        now.saturating_sub(time) < limit
    }
}

/// Check if `time` is later than every grant already recorded.
fn is_newer(resources: &crate::Resources, time: i64) -> bool {
    resources
        .values()
        .flat_map(|permissions| permissions.values())
        .all(|recorded| time > *recorded)
}

/// Current time in seconds since epoch.
pub(crate) fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}
