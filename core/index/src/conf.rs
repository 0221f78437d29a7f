//! Configuration of the index client, its credentials and bulk indexing.
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value as Json;

/// Configuration of the external index grants are persisted to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexConf {
    /// ID of the backend selected to provide the index.
    #[serde(default = "IndexConf::default_backend")]
    pub backend: String,

    /// Bulk indexing configuration.
    #[serde(default)]
    pub bulk: BulkConf,

    /// Ordered list of credentials to access the index with.
    ///
    /// Requests use one credential at a time and move on to the next one
    /// when the index reports an authentication failure.
    #[serde(default)]
    pub credentials: Vec<Credential>,

    /// Disable access to the index and operate with in-memory state only.
    #[serde(default = "IndexConf::default_enabled")]
    pub enabled: bool,

    /// Maximum number of hits requested for each search page.
    #[serde(default = "IndexConf::default_search_page_size")]
    pub search_page_size: usize,

    /// Backend specific configuration options.
    #[serde(default, flatten)]
    pub options: Json,
}

impl Default for IndexConf {
    fn default() -> Self {
        IndexConf {
            backend: IndexConf::default_backend(),
            bulk: Default::default(),
            credentials: Default::default(),
            enabled: IndexConf::default_enabled(),
            search_page_size: IndexConf::default_search_page_size(),
            options: Json::Object(Default::default()),
        }
    }
}

impl IndexConf {
    fn default_backend() -> String {
        String::from("elasticsearch")
    }

    fn default_enabled() -> bool {
        true
    }

    fn default_search_page_size() -> usize {
        1000
    }
}

/// Bulk indexing configuration.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BulkConf {
    /// Maximum time, in seconds, between flushes of buffered documents.
    #[serde(default = "BulkConf::default_flush_interval")]
    pub flush_interval_sec: u64,

    /// Number of buffered documents that triggers a flush before the interval elapses.
    #[serde(default = "BulkConf::default_max_batch")]
    pub max_batch: usize,

    /// Maximum number of documents waiting to be buffered before new ones are dropped.
    #[serde(default = "BulkConf::default_max_buffered")]
    pub max_buffered: usize,

    /// Maximum number of bulk requests in flight at once.
    #[serde(default = "BulkConf::default_workers")]
    pub workers: usize,
}

impl Default for BulkConf {
    fn default() -> Self {
        BulkConf {
            flush_interval_sec: BulkConf::default_flush_interval(),
            max_batch: BulkConf::default_max_batch(),
            max_buffered: BulkConf::default_max_buffered(),
            workers: BulkConf::default_workers(),
        }
    }
}

impl BulkConf {
    fn default_flush_interval() -> u64 {
        300
    }

    fn default_max_batch() -> usize {
        500
    }

    fn default_max_buffered() -> usize {
        1000
    }

    fn default_workers() -> usize {
        2
    }
}

/// Credential to authenticate requests to the index with.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Name of the credential, used to report which credential is in use.
    pub name: String,

    /// API key to authenticate with, takes precedence over username and password.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Password for HTTP basic authentication.
    #[serde(default)]
    pub password: Option<String>,

    /// Username for HTTP basic authentication.
    #[serde(default)]
    pub username: Option<String>,
}

impl Credential {
    /// Credential with a name and no secrets, useful with backends that do not authenticate.
    pub fn named<S: Into<String>>(name: S) -> Credential {
        Credential {
            name: name.into(),
            api_key: None,
            password: None,
            username: None,
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("name", &self.name)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("username", &self.username)
            .finish()
    }
}
