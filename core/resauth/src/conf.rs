//! Configuration of the resource authorisation cache and its external services.
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

/// Environment variable overriding the IAM token exchange URL.
pub const IAM_URL_ENV: &str = "BREAKGLASS_IAM_URL";

/// Options for the resource authorisation cache.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceAuthConf {
    /// Treat every resource as authorised without asking the policy service.
    #[serde(default)]
    pub bypass: bool,

    /// File holding the bypass flag, usually mounted from a secret store.
    ///
    /// The flag is set when the file contains `true` (ignoring case and whitespace).
    #[serde(default)]
    pub bypass_file: Option<String>,

    /// IAM token exchange used to authenticate with the policy service.
    #[serde(default)]
    pub iam: IamConf,

    /// Maximum number of keys in each cache table.
    #[serde(default = "ResourceAuthConf::default_max_entries")]
    pub max_entries: usize,

    /// Seconds a denied resource is cached for.
    #[serde(default = "ResourceAuthConf::default_negative_ttl")]
    pub negative_ttl_sec: u64,

    /// External policy service deciding resource access.
    #[serde(default)]
    pub policy: PolicyConf,

    /// Seconds an allowed resource is cached for.
    #[serde(default = "ResourceAuthConf::default_positive_ttl")]
    pub positive_ttl_sec: u64,

    /// Additional resources considered public, a trailing `*` matches any suffix.
    #[serde(default)]
    pub public_resources: Vec<String>,

    /// Seconds a service classification is cached for.
    #[serde(default = "ResourceAuthConf::default_service_type_ttl")]
    pub service_type_ttl_sec: u64,

    /// Seconds between sweeps of expired entries.
    #[serde(default = "ResourceAuthConf::default_sweep_interval")]
    pub sweep_interval_sec: u64,

    /// Seconds a user classification is cached for.
    #[serde(default = "ResourceAuthConf::default_positive_ttl")]
    pub user_type_ttl_sec: u64,
}

impl Default for ResourceAuthConf {
    fn default() -> Self {
        ResourceAuthConf {
            bypass: false,
            bypass_file: None,
            iam: Default::default(),
            max_entries: Self::default_max_entries(),
            negative_ttl_sec: Self::default_negative_ttl(),
            policy: Default::default(),
            positive_ttl_sec: Self::default_positive_ttl(),
            public_resources: Vec::new(),
            service_type_ttl_sec: Self::default_service_type_ttl(),
            sweep_interval_sec: Self::default_sweep_interval(),
            user_type_ttl_sec: Self::default_positive_ttl(),
        }
    }
}

impl ResourceAuthConf {
    fn default_max_entries() -> usize {
        10_000
    }

    fn default_negative_ttl() -> u64 {
        5 * 60
    }

    fn default_positive_ttl() -> u64 {
        30 * 60
    }

    fn default_service_type_ttl() -> u64 {
        60 * 60
    }

    fn default_sweep_interval() -> u64 {
        3 * 60
    }

    pub fn negative_ttl(&self) -> Duration {
        Duration::from_secs(self.negative_ttl_sec)
    }

    pub fn positive_ttl(&self) -> Duration {
        Duration::from_secs(self.positive_ttl_sec)
    }

    pub fn service_type_ttl(&self) -> Duration {
        Duration::from_secs(self.service_type_ttl_sec)
    }

    /// Interval between sweeps, never shorter than one second.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_sec.max(1))
    }

    pub fn user_type_ttl(&self) -> Duration {
        Duration::from_secs(self.user_type_ttl_sec)
    }
}

/// Options for the IAM token exchange.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IamConf {
    /// Seconds exchanged tokens are reused for.
    #[serde(default = "IamConf::default_token_ttl")]
    pub token_ttl_sec: u64,

    /// Timeout, in seconds, for token exchange requests.
    #[serde(default = "IamConf::default_timeout")]
    pub timeout_sec: u64,

    /// Token exchange endpoint, replaced by the `BREAKGLASS_IAM_URL` environment variable when set.
    #[serde(default = "IamConf::default_url")]
    pub url: String,
}

impl Default for IamConf {
    fn default() -> Self {
        IamConf {
            token_ttl_sec: Self::default_token_ttl(),
            timeout_sec: Self::default_timeout(),
            url: Self::default_url(),
        }
    }
}

impl IamConf {
    fn default_token_ttl() -> u64 {
        45 * 60
    }

    fn default_timeout() -> u64 {
        30
    }

    fn default_url() -> String {
        "https://iam.cloud.ibm.com/identity/token".into()
    }

    /// Token exchange endpoint after environment overrides.
    pub fn effective_url(&self) -> String {
        match std::env::var(IAM_URL_ENV) {
            Ok(url) if !url.is_empty() => url,
            _ => self.url.clone(),
        }
    }
}

/// Options for the external policy service.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConf {
    /// API key exchanged for IAM tokens to call the policy service with.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Name exchanged tokens are cached under.
    #[serde(default = "PolicyConf::default_key_name")]
    pub key_name: String,

    /// Timeout, in seconds, for policy requests.
    #[serde(default = "PolicyConf::default_timeout")]
    pub timeout_sec: u64,

    /// Policy service endpoint.
    #[serde(default)]
    pub url: String,
}

impl Default for PolicyConf {
    fn default() -> Self {
        PolicyConf {
            api_key: None,
            key_name: Self::default_key_name(),
            timeout_sec: Self::default_timeout(),
            url: String::new(),
        }
    }
}

impl PolicyConf {
    fn default_key_name() -> String {
        "servicenow".into()
    }

    fn default_timeout() -> u64 {
        30
    }
}

impl std::fmt::Debug for PolicyConf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyConf")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("key_name", &self.key_name)
            .field("timeout_sec", &self.timeout_sec)
            .field("url", &self.url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::ResourceAuthConf;

    #[test]
    fn defaults() {
        let conf: ResourceAuthConf = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(conf, ResourceAuthConf::default());
        assert_eq!(conf.max_entries, 10_000);
        assert_eq!(conf.positive_ttl_sec, 1800);
        assert_eq!(conf.negative_ttl_sec, 300);
        assert_eq!(conf.user_type_ttl_sec, 1800);
        assert_eq!(conf.service_type_ttl_sec, 3600);
        assert_eq!(conf.sweep_interval_sec, 180);
        assert_eq!(conf.iam.token_ttl_sec, 2700);
        assert_eq!(conf.policy.timeout_sec, 30);
    }

    #[test]
    fn sweep_interval_is_never_zero() {
        let conf = ResourceAuthConf {
            sweep_interval_sec: 0,
            ..Default::default()
        };
        assert_eq!(conf.sweep_interval().as_secs(), 1);
    }

    #[test]
    fn api_key_is_redacted() {
        let mut conf = ResourceAuthConf::default();
        conf.policy.api_key = Some("secret-value".into());
        let debug = format!("{:?}", conf);
        assert!(!debug.contains("secret-value"));
    }
}
