//! Batched resource authorisation backed by the cache and the policy service.
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;

use breakglass_context::Context;

use crate::crn::Crn;
use crate::crn::PublicResources;
use crate::iam::IamClient;
use crate::policy::PolicyClient;
use crate::policy::PolicyRequest;
use crate::policy::ServiceNow;
use crate::BypassFlag;
use crate::ResourceAuthCache;
use crate::ResourceAuthConf;

/// Decide access to batches of resources for a user.
pub struct ResourceAuthorizer {
    bypass: Arc<BypassFlag>,
    cache: Arc<ResourceAuthCache>,
    policy: Arc<dyn PolicyClient>,
    public: PublicResources,
}

impl ResourceAuthorizer {
    pub fn new(
        bypass: Arc<BypassFlag>,
        cache: Arc<ResourceAuthCache>,
        policy: Arc<dyn PolicyClient>,
        public: PublicResources,
    ) -> ResourceAuthorizer {
        ResourceAuthorizer {
            bypass,
            cache,
            policy,
            public,
        }
    }

    /// Build an authorizer asking the ServiceNow policy service configured in `conf`.
    ///
    /// Returns `None` when no policy service is configured.
    pub fn from_conf(
        conf: &ResourceAuthConf,
        cache: Arc<ResourceAuthCache>,
        bypass: Arc<BypassFlag>,
    ) -> Result<Option<ResourceAuthorizer>> {
        if conf.policy.url.is_empty() {
            return Ok(None);
        }
        let iam = Arc::new(IamClient::new(&conf.iam)?);
        let policy = Arc::new(ServiceNow::new(&conf.policy, iam)?);
        let public = PublicResources::new(conf.public_resources.clone());
        let authorizer = ResourceAuthorizer::new(bypass, cache, policy, public);
        Ok(Some(authorizer))
    }

    /// Decide which resources the user can access.
    ///
    /// Cached decisions are used first. Public resources, or any resource while the
    /// bypass flag is set, are allowed without asking the policy service.
    /// Everything else is decided by a single policy request and cached.
    ///
    /// Resources the policy service returns no decision for are denied but not cached.
    /// Policy service errors are returned to the caller.
    pub async fn authorize(
        &self,
        context: &Context,
        email: &str,
        resources: &[String],
    ) -> Result<BTreeMap<String, bool>> {
        let resources: BTreeSet<&String> = resources.iter().collect();
        let mut decisions = BTreeMap::new();
        let mut pending = Vec::new();
        let bypass = self.bypass.is_set();

        for resource in resources {
            if let Some(allowed) = self.cache.lookup(email, resource) {
                decisions.insert(resource.clone(), allowed);
                continue;
            }
            if bypass || self.public.matches(resource) {
                self.cache.add(context, email, resource, true);
                decisions.insert(resource.clone(), true);
                continue;
            }
            pending.push(PolicyRequest {
                user_name: email.to_string(),
                crn: resource.clone(),
            });
        }
        if pending.is_empty() {
            return Ok(decisions);
        }

        crate::telemetry::POLICY_CALLS.inc();
        let responses = match self.policy.authorize(context, &pending).await {
            Ok(responses) => responses,
            Err(error) => {
                crate::telemetry::POLICY_ERR.inc();
                slog::warn!(
                    context.logger, "Policy service request failed";
                    "email" => email, "resources" => pending.len(),
                    replisdk::utils::error::slog::ErrorAttributes::from(&error),
                );
                return Err(error);
            }
        };

        for response in responses {
            let requested = pending.iter().any(|request| request.crn == response.crn);
            if !requested {
                continue;
            }
            let allowed = response.authorized.valid;
            self.cache.add(context, email, &response.crn, allowed);
            if let Some(kind) = &response.user_type {
                self.cache.set_user_type(context, email, kind);
            }
            if let (Some(kind), Ok(crn)) = (&response.service_type, Crn::parse(&response.crn)) {
                self.cache
                    .set_service_type(context, &crn.service_name, kind);
            }
            decisions.insert(response.crn, allowed);
        }
        for request in pending {
            decisions.entry(request.crn).or_insert(false);
        }
        Ok(decisions)
    }

    /// Cache decisions are stored in.
    pub fn cache(&self) -> &ResourceAuthCache {
        &self.cache
    }
}
