//! Configuration of the break-glass grants cache.
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

/// Options for the grants cache and its bootstrap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantsConf {
    /// Seconds to wait after process start before loading grants from the index.
    #[serde(default = "GrantsConf::default_bootstrap_delay")]
    pub bootstrap_delay_sec: u64,

    /// Maximum number of seconds a grant is honoured after it was last observed.
    #[serde(default = "GrantsConf::default_duration_limit")]
    pub duration_limit_sec: u64,

    /// Name of the index grant documents are stored in.
    #[serde(default = "GrantsConf::default_index")]
    pub index: String,
}

impl Default for GrantsConf {
    fn default() -> Self {
        GrantsConf {
            bootstrap_delay_sec: Self::default_bootstrap_delay(),
            duration_limit_sec: Self::default_duration_limit(),
            index: Self::default_index(),
        }
    }
}

impl GrantsConf {
    fn default_bootstrap_delay() -> u64 {
        30
    }

    fn default_duration_limit() -> u64 {
        60 * 24 * 60 * 60
    }

    fn default_index() -> String {
        "breakglass-grants".into()
    }

    /// Warm-up interval before bootstrap reads from the index.
    pub fn bootstrap_delay(&self) -> Duration {
        Duration::from_secs(self.bootstrap_delay_sec)
    }
}

#[cfg(test)]
mod tests {
    use super::GrantsConf;

    #[test]
    fn defaults() {
        let conf: GrantsConf = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(conf, GrantsConf::default());
        assert_eq!(conf.duration_limit_sec, 5_184_000);
        assert_eq!(conf.bootstrap_delay_sec, 30);
    }
}
