//! In-memory policy service for unit tests.
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use anyhow::Result;

use breakglass_context::Context;

use crate::policy::Authorized;
use crate::policy::PolicyClient;
use crate::policy::PolicyDecision;
use crate::policy::PolicyRequest;

/// Policy service mock that allows only explicitly permitted resources.
#[derive(Clone, Default)]
pub struct PolicyFixture {
    inner: Arc<Mutex<PolicyFixtureState>>,
}

#[derive(Default)]
struct PolicyFixtureState {
    allowed: HashSet<(String, String)>,
    calls: Vec<Vec<PolicyRequest>>,
    fail: bool,
    service_types: HashMap<String, String>,
    user_types: HashMap<String, String>,
}

impl PolicyFixture {
    /// Allow the user to access the resource.
    pub fn allow(&self, email: &str, crn: &str) {
        self.access()
            .allowed
            .insert((email.to_string(), crn.to_string()));
    }

    /// Batches of requests received, in order.
    pub fn calls(&self) -> Vec<Vec<PolicyRequest>> {
        self.access().calls.clone()
    }

    /// Fail all future requests.
    pub fn fail(&self) {
        self.access().fail = true;
    }

    /// Report a service classification for a resource.
    pub fn service_type(&self, crn: &str, kind: &str) {
        self.access()
            .service_types
            .insert(crn.to_string(), kind.to_string());
    }

    /// Report a user classification.
    pub fn user_type(&self, email: &str, kind: &str) {
        self.access()
            .user_types
            .insert(email.to_string(), kind.to_string());
    }

    fn access(&self) -> MutexGuard<PolicyFixtureState> {
        self.inner
            .lock()
            .expect("PolicyFixture::inner state lock poisoned")
    }
}

#[async_trait::async_trait]
impl PolicyClient for PolicyFixture {
    async fn authorize(
        &self,
        _: &Context,
        requests: &[PolicyRequest],
    ) -> Result<Vec<PolicyDecision>> {
        let mut state = self.access();
        state.calls.push(requests.to_vec());
        if state.fail {
            anyhow::bail!("policy fixture configured to fail");
        }
        let decisions = requests
            .iter()
            .map(|request| {
                let key = (request.user_name.clone(), request.crn.clone());
                PolicyDecision {
                    user_name: request.user_name.clone(),
                    crn: request.crn.clone(),
                    user_type: state.user_types.get(&request.user_name).cloned(),
                    service_type: state.service_types.get(&request.crn).cloned(),
                    authorized: Authorized {
                        valid: state.allowed.contains(&key),
                        message: String::new(),
                    },
                }
            })
            .collect();
        Ok(decisions)
    }
}
