//! HTTP endpoint exposing process metrics for scraping.
use actix_web::HttpServer;
use anyhow::Result;

use replisdk::runtime::actix_web::AppConfigurer;
use replisdk::runtime::actix_web::AppFactory;
use replisdk::runtime::actix_web::ServerConfig;

/// Prefix for request metrics names.
const REQUEST_METRICS_PREFIX: &str = "breakglass";

/// Serves the process [`Registry`](prometheus::Registry) from an ActixWeb Server.
///
/// The cache has no HTTP API of its own so the server only carries the routes
/// and request metrics added by [`AppFactory`].
#[derive(Clone)]
pub struct MetricsServer {
    app: AppConfigurer,
    conf: ServerConfig,
    metrics: prometheus::Registry,
}

impl MetricsServer {
    pub fn new(conf: ServerConfig, metrics: prometheus::Registry) -> Self {
        MetricsServer {
            app: Default::default(),
            conf,
            metrics,
        }
    }

    /// Bind the configured address and start serving.
    ///
    /// Signals are handled by the process shutdown manager, not by actix.
    pub fn run(self) -> Result<actix_web::dev::Server> {
        let factory = AppFactory::configure(self.app, self.conf.clone())
            .metrics(REQUEST_METRICS_PREFIX, self.metrics)
            .done();
        let server = HttpServer::new(move || {
            let app = factory.initialise();
            factory.finalise(app)
        })
        .disable_signals();
        let server = self.conf.apply(server)?;
        Ok(server.run())
    }
}
