//! Exchange API keys for IAM bearer tokens, reusing tokens until they expire.
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context as AnyContext;
use anyhow::Result;
use reqwest::Client;
use serde::Deserialize;
use tokio::time::Instant;

use breakglass_context::Context;

use crate::IamConf;

/// Grant type for the API key to token exchange.
pub const GRANT_TYPE_API_KEY: &str = "urn:ibm:params:oauth:grant-type:apikey";

/// Name of the IAM service in errors.
const SERVICE: &str = "IAM";

/// Response to a token exchange request.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Tokens by key name, each with its expiry time.
#[derive(Debug)]
pub struct TokenCache {
    tokens: Mutex<HashMap<String, (String, Instant)>>,
    ttl: Duration,
}

impl TokenCache {
    pub fn new(ttl: Duration) -> TokenCache {
        TokenCache {
            tokens: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Look up an unexpired token.
    pub fn get(&self, name: &str) -> Option<String> {
        let now = Instant::now();
        self.tokens
            .lock()
            .expect("TokenCache::tokens lock poisoned")
            .get(name)
            .filter(|(_, expires)| *expires > now)
            .map(|(token, _)| token.clone())
    }

    /// Store a token for the configured lifetime.
    pub fn insert(&self, name: &str, token: String) {
        let expires = crate::cache::expires_after(self.ttl);
        self.tokens
            .lock()
            .expect("TokenCache::tokens lock poisoned")
            .insert(name.to_string(), (token, expires));
    }
}

/// Client to the IAM token exchange.
pub struct IamClient {
    cache: TokenCache,
    client: Client,
    url: String,
}

impl IamClient {
    pub fn new(conf: &IamConf) -> Result<IamClient> {
        let client = Client::builder()
            .timeout(Duration::from_secs(conf.timeout_sec))
            .build()
            .context("unable to initialise IAM client")?;
        Ok(IamClient {
            cache: TokenCache::new(Duration::from_secs(conf.token_ttl_sec)),
            client,
            url: conf.effective_url(),
        })
    }

    /// Return a bearer token for the API key, exchanging it with IAM if needed.
    pub async fn token(&self, context: &Context, name: &str, api_key: &str) -> Result<String> {
        if let Some(token) = self.cache.get(name) {
            return Ok(token);
        }

        crate::telemetry::IAM_TOKEN_FETCH.inc();
        slog::debug!(context.logger, "Exchanging API key for IAM token"; "key" => name);
        let form = [("grant_type", GRANT_TYPE_API_KEY), ("apikey", api_key)];
        let result = async {
            let response = self
                .client
                .post(&self.url)
                .header(reqwest::header::ACCEPT, "application/json")
                .form(&form)
                .send()
                .await?;
            crate::http::inspect::<TokenResponse>(response, SERVICE).await
        }
        .await;
        let response = match result {
            Ok(response) => response,
            Err(error) => {
                crate::telemetry::IAM_TOKEN_ERR.inc();
                return Err(error);
            }
        };
        self.cache.insert(name, response.access_token.clone());
        Ok(response.access_token)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::TokenCache;
    use super::TokenResponse;

    #[tokio::test(start_paused = true)]
    async fn tokens_expire() {
        let cache = TokenCache::new(Duration::from_secs(45 * 60));
        cache.insert("servicenow", "token-1".into());
        assert_eq!(cache.get("servicenow"), Some("token-1".to_string()));
        assert_eq!(cache.get("other"), None);

        tokio::time::advance(Duration::from_secs(44 * 60)).await;
        assert_eq!(cache.get("servicenow"), Some("token-1".to_string()));
        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        assert_eq!(cache.get("servicenow"), None);
    }

    #[test]
    fn decode_token_response() {
        let response: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "eyJ...",
            "refresh_token": "not_supported",
            "token_type": "Bearer",
            "expires_in": 3600,
        }))
        .unwrap();
        assert_eq!(response.access_token, "eyJ...");
    }
}
