//! Errors reported by the resource authorisation components.

/// The resource name is not a valid CRN.
#[derive(Debug, thiserror::Error)]
#[error("'{0}' is not a valid CRN")]
pub struct InvalidCrn(pub String);

/// Invalid response received from an external service.
#[derive(Debug, thiserror::Error)]
#[error("invalid response received from {service}: {response}")]
pub struct InvalidResponse {
    pub response: String,
    pub service: &'static str,
}

/// The policy service is not configured.
#[derive(Debug, thiserror::Error)]
#[error("the policy service URL is not configured")]
pub struct PolicyNotConfigured;

/// The external service rejected or failed the request.
#[derive(Debug, thiserror::Error)]
#[error("{service} request failed (status {status}): {response}")]
pub struct RequestFailed {
    pub response: String,
    pub service: &'static str,
    pub status: u16,
}

/// No API key is configured to exchange for IAM tokens.
#[derive(Debug, thiserror::Error)]
#[error("no API key configured to authenticate with the policy service")]
pub struct MissingApiKey;

/// Unable to read the bypass flag file.
#[derive(Debug, thiserror::Error)]
#[error("unable to read the bypass flag from '{0}'")]
pub struct BypassFileRead(pub String);
