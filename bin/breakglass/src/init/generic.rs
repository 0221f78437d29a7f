//! Process initialisation builder for aspects to initialise for all commands.
use std::time::Duration;

use anyhow::Context as AnyContext;
use anyhow::Result;

use replisdk::runtime::shutdown::ShutdownManager;
use replisdk::runtime::shutdown::ShutdownManagerBuilder;
use replisdk::runtime::telemetry;
use replisdk::runtime::telemetry::Telemetry;
use replisdk::runtime::telemetry::TelemetryConfig;
use replisdk::runtime::telemetry::TelemetryOptions;

use breakglass_conf::Conf;
use breakglass_context::Context;
use breakglass_crypto::Envelope;
use breakglass_index::IndexFactory;
use breakglass_resauth::iam::IamClient;
use breakglass_resauth::policy::ServiceNow;

use super::metrics::MetricsServer;
use super::backends::Backends;

/// Process builder to initialise all break-glass commands.
pub struct GenericInit {
    pub metrics: MetricsServer,
    pub backends: Backends,
    pub conf: Conf,
    pub shutdown: ShutdownManagerBuilder<()>,
    pub telemetry: Telemetry,
}

impl GenericInit {
    /// Build a process from the loaded configuration.
    pub async fn configure(conf: Conf) -> Result<Self> {
        let telemetry = telemetry(conf.telemetry.clone()).await?;
        let metrics = MetricsServer::new(conf.http.clone(), telemetry.metrics.clone());
        let shutdown = shutdown_manager(telemetry.logger.clone(), &conf);
        let generic = Self {
            metrics,
            backends: Default::default(),
            conf,
            shutdown,
            telemetry,
        };
        Ok(generic)
    }

    /// Root context for the process.
    pub fn context(&self) -> Context {
        Context::root(self.telemetry.logger.clone()).build()
    }

    /// Lookup the factory for the configured index backend.
    pub fn index_factory(&self) -> Result<&dyn IndexFactory> {
        self.backends.index(&self.conf.index.backend)
    }

    /// Register all supported backends.
    ///
    /// Supported backends can be tuned at compile time using crate features.
    pub fn register_default_backends(&mut self) -> &mut Self {
        #[cfg(feature = "elasticsearch")]
        self.backends.register_index(
            "elasticsearch",
            breakglass_index_elasticsearch::ElasticsearchFactory,
        );
        self
    }

    /// Register metrics for all components and the selected backend.
    pub fn register_metrics(&self) -> Result<&Self> {
        let registry = &self.telemetry.metrics;
        self.index_factory()?.register_metrics(registry)?;
        breakglass_grants::telemetry::register_metrics(registry)?;
        breakglass_index::telemetry::register_metrics(registry)?;
        breakglass_resauth::telemetry::register_metrics(registry)?;
        Ok(self)
    }

    /// Run the metrics API server.
    pub fn run_server(&mut self, context: &Context) -> Result<&mut Self> {
        slog::debug!(context.logger, "Starting metrics server");
        let server = self.metrics.clone().run()?;
        self.shutdown.watch_actix(server, ());
        slog::info!(
            context.logger, "Metrics server listening for connection";
            "address" => &self.conf.http.bind,
        );
        Ok(self)
    }

    /// Validate the loaded configuration for all components and the selected backend.
    pub fn validate_conf(&self, context: &Context) -> Result<&Self> {
        Envelope::from_conf(&self.conf.crypto).context("invalid crypto configuration")?;
        if self.conf.index.enabled {
            self.index_factory()?
                .conf_check(context, &self.conf.index.options)?;
        }
        let resource_auth = &self.conf.resource_auth;
        if !resource_auth.policy.url.is_empty() {
            let iam = IamClient::new(&resource_auth.iam)?;
            ServiceNow::new(&resource_auth.policy, std::sync::Arc::new(iam))
                .context("invalid policy service configuration")?;
        }
        Ok(self)
    }

    /// Initialisation done, wait until the process fails or the user shuts it down.
    pub async fn wait(self) -> Result<()> {
        slog::info!(
            self.telemetry.logger,
            "Break-glass cache process initialisation complete"
        );
        let exit = self.shutdown.build();
        exit.wait().await
    }
}

/// Initialise process shutdown manager.
pub fn shutdown_manager(logger: slog::Logger, conf: &Conf) -> ShutdownManagerBuilder<()> {
    let grace = Duration::from_secs(conf.runtime.shutdown_grace_sec);
    let mut shutdown = ShutdownManager::builder();
    shutdown
        .logger(logger)
        .graceful_shutdown_timeout(grace)
        .watch_signal_with_default();
    shutdown
}

/// Initialise process telemetry.
pub async fn telemetry(conf: TelemetryConfig) -> Result<Telemetry> {
    let telemetry_options = TelemetryOptions::for_sentry_release(super::RELEASE_ID)
        .for_app(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        .finish();
    let telemetry = telemetry::initialise(conf, telemetry_options).await?;
    slog::info!(telemetry.logger, "Process telemetry initialised");
    Ok(telemetry)
}
