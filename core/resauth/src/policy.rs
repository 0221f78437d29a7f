//! Interface to the external policy service deciding resource access.
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as AnyContext;
use anyhow::Result;
use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;

use breakglass_context::Context;

use crate::errors::MissingApiKey;
use crate::errors::PolicyNotConfigured;
use crate::iam::IamClient;
use crate::PolicyConf;

/// Name of the policy service in errors.
const SERVICE: &str = "ServiceNow";

/// Request to authorise a user on a resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRequest {
    pub user_name: String,
    pub crn: String,
}

/// Decision of the policy service for a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub user_name: String,
    pub crn: String,

    #[serde(rename = "userType", default)]
    pub user_type: Option<String>,

    #[serde(rename = "serviceType", default)]
    pub service_type: Option<String>,

    pub authorized: Authorized,
}

/// Outcome of a policy decision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorized {
    pub valid: bool,

    #[serde(default)]
    pub message: String,
}

/// Response envelope of the policy service.
#[derive(Debug, Deserialize)]
struct PolicyResponse {
    #[serde(default)]
    result: Vec<PolicyDecision>,
}

/// Operations implemented by policy services.
#[async_trait::async_trait]
pub trait PolicyClient: Send + Sync {
    /// Decide a batch of requests with a single call.
    async fn authorize(
        &self,
        context: &Context,
        requests: &[PolicyRequest],
    ) -> Result<Vec<PolicyDecision>>;
}

/// Policy decisions from ServiceNow, authenticated with IAM tokens.
pub struct ServiceNow {
    api_key: String,
    client: Client,
    iam: Arc<IamClient>,
    key_name: String,
    url: String,
}

impl ServiceNow {
    pub fn new(conf: &PolicyConf, iam: Arc<IamClient>) -> Result<ServiceNow> {
        if conf.url.is_empty() {
            anyhow::bail!(PolicyNotConfigured);
        }
        let api_key = conf.api_key.clone().ok_or(MissingApiKey)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(conf.timeout_sec))
            .build()
            .context("unable to initialise ServiceNow client")?;
        Ok(ServiceNow {
            api_key,
            client,
            iam,
            key_name: conf.key_name.clone(),
            url: conf.url.clone(),
        })
    }
}

#[async_trait::async_trait]
impl PolicyClient for ServiceNow {
    async fn authorize(
        &self,
        context: &Context,
        requests: &[PolicyRequest],
    ) -> Result<Vec<PolicyDecision>> {
        let token = self
            .iam
            .token(context, &self.key_name, &self.api_key)
            .await?;
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(token)
            .json(requests)
            .send()
            .await?;
        let response: PolicyResponse = crate::http::inspect(response, SERVICE).await?;
        Ok(response.result)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::PolicyRequest;
    use super::PolicyResponse;

    #[test]
    fn encode_requests() {
        let requests = vec![PolicyRequest {
            user_name: "e@example.com".into(),
            crn: "crn:v1:bluemix:public:kms:us-south:a/1:i::".into(),
        }];
        let body = serde_json::to_value(requests).unwrap();
        assert_eq!(
            body,
            json!([{
                "user_name": "e@example.com",
                "crn": "crn:v1:bluemix:public:kms:us-south:a/1:i::",
            }])
        );
    }

    #[test]
    fn decode_response() {
        let response: PolicyResponse = serde_json::from_value(json!({
            "result": [
                {
                    "user_name": "e@example.com",
                    "crn": "R1",
                    "userType": "employee",
                    "serviceType": "internal",
                    "authorized": {"valid": true, "message": "ok"},
                },
                {
                    "user_name": "e@example.com",
                    "crn": "R2",
                    "authorized": {"valid": false},
                },
            ],
        }))
        .unwrap();
        assert_eq!(response.result.len(), 2);
        assert!(response.result[0].authorized.valid);
        assert_eq!(response.result[0].user_type.as_deref(), Some("employee"));
        assert!(!response.result[1].authorized.valid);
        assert_eq!(response.result[1].service_type, None);
    }
}
