//! Errors encountered during index requests or reported by the remote server.
use anyhow::Result;
use reqwest::Response;
use serde::de::DeserializeOwned;

/// The client sent an invalid request.
#[derive(Debug, thiserror::Error)]
#[error("the client sent an invalid request (status {status}): {response}")]
pub struct ClientError {
    pub response: String,
    pub status: u16,
}

/// Invalid response received.
#[derive(Debug, thiserror::Error)]
#[error("invalid response received: {response}")]
pub struct InvalidResponse {
    pub response: String,
}

/// The search cursor was not produced by this backend.
#[derive(Debug, thiserror::Error)]
#[error("invalid search cursor")]
pub struct InvalidCursor;

/// The requested index does not exist.
#[derive(Debug, thiserror::Error)]
#[error("the requested index does not exist")]
pub struct IndexNotFound;

/// The server failed to process the request.
#[derive(Debug, thiserror::Error)]
#[error("the server failed to process the request (status {status}): {response}")]
pub struct ServerError {
    pub response: String,
    pub status: u16,
}

/// Decode the body of an HTTP response and correctly handle errors in the process.
///
/// Authentication failures are reported as [`Unauthorized`] so the index client
/// can rotate credentials.
///
/// [`Unauthorized`]: breakglass_index::error::Unauthorized
pub async fn inspect<T>(response: Response, credential: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let code = response.status();
    let text = response.text().await?;

    if matches!(code, reqwest::StatusCode::UNAUTHORIZED) {
        let error = breakglass_index::error::Unauthorized(credential.to_string());
        anyhow::bail!(error);
    }
    if matches!(code, reqwest::StatusCode::NOT_FOUND) {
        let error = anyhow::anyhow!(ClientError {
            response: text,
            status: code.as_u16(),
        });
        return Err(error.context(IndexNotFound));
    }
    if code.is_client_error() {
        anyhow::bail!(ClientError {
            response: text,
            status: code.as_u16(),
        });
    }
    if code.is_server_error() {
        anyhow::bail!(ServerError {
            response: text,
            status: code.as_u16(),
        });
    }

    serde_json::from_str::<T>(&text).map_err(|error| {
        let decode = InvalidResponse { response: text };
        anyhow::anyhow!(error).context(decode)
    })
}
