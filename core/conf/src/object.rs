//! Data object storing the process configuration.
use serde::Deserialize;
use serde::Serialize;

use replisdk::runtime::actix_web::ServerConfig;
use replisdk::runtime::shutdown::DEFAULT_SHUTDOWN_GRACE_TIMEOUT;
use replisdk::runtime::telemetry::TelemetryConfig;
use replisdk::runtime::tokio_conf::TokioRuntimeConf;

use breakglass_crypto::CryptoConf;
use breakglass_grants::GrantsConf;
use breakglass_index::IndexConf;
use breakglass_resauth::ResourceAuthConf;

/// Global configuration for the break-glass authorisation cache process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conf {
    /// Keys used to seal secrets persisted to the index.
    #[serde(default)]
    pub crypto: CryptoConf,

    /// Break-glass grants cache options.
    #[serde(default)]
    pub grants: GrantsConf,

    /// HTTP Server configuration for the metrics endpoint.
    #[serde(default)]
    pub http: ServerConfig,

    /// Index grants are persisted to.
    #[serde(default)]
    pub index: IndexConf,

    /// Resource authorisation cache and policy service options.
    #[serde(default)]
    pub resource_auth: ResourceAuthConf,

    /// Process runtime configuration.
    #[serde(default)]
    pub runtime: RuntimeConf,

    /// Telemetry configuration for the process.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Container for the complete process runtime configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConf {
    /// Allowed time, in seconds, for running operations to complete once process shutdown begins.
    #[serde(default = "RuntimeConf::default_shutdown_grace")]
    pub shutdown_grace_sec: u64,

    /// Tokio Runtime configuration.
    #[serde(default, flatten)]
    pub tokio: TokioRuntimeConf,
}

impl RuntimeConf {
    fn default_shutdown_grace() -> u64 {
        DEFAULT_SHUTDOWN_GRACE_TIMEOUT
    }
}

impl Default for RuntimeConf {
    fn default() -> Self {
        RuntimeConf {
            shutdown_grace_sec: Self::default_shutdown_grace(),
            tokio: Default::default(),
        }
    }
}
