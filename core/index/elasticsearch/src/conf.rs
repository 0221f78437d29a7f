//! Configuration for the Elasticsearch index backend.
use serde::Deserialize;
use serde::Serialize;

/// Elasticsearch specific configuration for the index interface.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Conf {
    /// Timeout, in seconds, to establish connections to the service.
    #[serde(default = "Conf::default_timeout_connect")]
    pub timeout_connect_sec: u64,

    /// Timeout, in seconds, for individual requests to complete.
    #[serde(default = "Conf::default_timeout")]
    pub timeout_sec: u64,

    /// Base URL of the Elasticsearch service, with a trailing `/`.
    pub url: String,
}

impl Conf {
    fn default_timeout() -> u64 {
        30
    }

    fn default_timeout_connect() -> u64 {
        10
    }

    /// Build the URL to an API path relative to the configured base URL.
    pub fn endpoint(&self, path: &str) -> String {
        if self.url.ends_with('/') {
            format!("{}{}", self.url, path)
        } else {
            format!("{}/{}", self.url, path)
        }
    }
}

/// The Elasticsearch index backend configuration is not valid.
#[derive(Debug, thiserror::Error)]
#[error("the Elasticsearch index backend configuration is not valid")]
pub struct ConfError;
