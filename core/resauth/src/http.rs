//! Helpers shared by the HTTP clients to external services.
use anyhow::Result;
use reqwest::Response;
use serde::de::DeserializeOwned;

use crate::errors::InvalidResponse;
use crate::errors::RequestFailed;

/// Decode the body of an HTTP response, reporting non-success statuses as [`RequestFailed`].
pub async fn inspect<T>(response: Response, service: &'static str) -> Result<T>
where
    T: DeserializeOwned,
{
    let code = response.status();
    let text = response.text().await?;
    if !code.is_success() {
        anyhow::bail!(RequestFailed {
            response: text,
            service,
            status: code.as_u16(),
        });
    }
    serde_json::from_str::<T>(&text).map_err(|error| {
        let decode = InvalidResponse {
            response: text,
            service,
        };
        anyhow::anyhow!(error).context(decode)
    })
}
