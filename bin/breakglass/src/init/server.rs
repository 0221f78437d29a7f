//! Break-glass cache server initialisation as a builder.
use std::sync::Arc;

use anyhow::Result;

use breakglass_conf::Conf;
use breakglass_context::Context;
use breakglass_crypto::Envelope;
use breakglass_grants::GrantCache;
use breakglass_grants::WriteGate;
use breakglass_index::BulkWorker;
use breakglass_index::Index;
use breakglass_index::IndexFactory;
use breakglass_index::IndexFactoryArgs;
use breakglass_resauth::BypassFlag;
use breakglass_resauth::ResourceAuthCache;
use breakglass_resauth::ResourceAuthConf;
use breakglass_resauth::ResourceAuthorizer;
use breakglass_resauth::Sweeper;

use super::generic::GenericInit;
use super::services::Services;

/// Process builder to initialise and run a break-glass cache instance.
pub struct Server {
    /// Process initialisation logic common to all commands.
    generic: GenericInit,
}

impl Server {
    /// Build a server from the loaded configuration.
    pub async fn configure(conf: Conf) -> Result<Self> {
        let generic = GenericInit::configure(conf).await?;
        Ok(Self { generic })
    }

    /// Register all supported backends.
    ///
    /// Supported backends can be tuned at compile time using crate features.
    pub fn register_default_backends(mut self) -> Self {
        self.generic.register_default_backends();
        self
    }

    /// Finalise process initialisation and run the server.
    pub async fn run(mut self) -> Result<()> {
        let context = self.generic.context();
        self.generic.validate_conf(&context)?.register_metrics()?;
        let conf = self.generic.conf.clone();

        // Grants cache, persisted to the index when one is available.
        let envelope = Arc::new(Envelope::from_conf(&conf.crypto)?);
        let index = match index(&context, &self.generic).await {
            Ok((index, worker)) => {
                self.generic.shutdown.watch_tokio(tokio::spawn(worker.run()));
                Some(index)
            }
            Err(error) => {
                slog::warn!(
                    context.logger, "Grants index not available, grants will not be persisted";
                    replisdk::utils::error::slog::ErrorAttributes::from(&error),
                );
                None
            }
        };
        let gate = WriteGate::default();
        let grants = Arc::new(GrantCache::new(conf.grants.clone(), envelope, gate, index));
        let bootstrap_context =
            context.derive_with(|ctx| ctx.log_values(slog::o!("task" => "bootstrap")));
        let bootstrap_grants = Arc::clone(&grants);
        tokio::spawn(async move {
            let result = breakglass_grants::bootstrap(&bootstrap_context, &bootstrap_grants).await;
            if let Err(error) = result {
                slog::error!(
                    bootstrap_context.logger, "Grants bootstrap failed, index writes stay disabled";
                    replisdk::utils::error::slog::ErrorAttributes::from(&error),
                );
            }
        });

        // Resource authorisation cache, swept only when decisions can be cached.
        let authorizer = match resource_auth(&context, &conf.resource_auth).await? {
            Some((authorizer, sweeper)) => {
                self.generic.shutdown.watch_tokio(tokio::spawn(sweeper.run()));
                Some(authorizer)
            }
            None => {
                slog::info!(
                    context.logger,
                    "No policy service configured, resource authorisation is disabled"
                );
                None
            }
        };
        let services = Services {
            grants,
            resource_auth: authorizer,
        };

        // Run until user-requested exit or process error.
        self.generic.run_server(&context)?;
        let result = self.generic.wait().await;

        // Send grants still buffered for the index before exiting.
        if let Some(index) = services.grants.index() {
            if let Err(error) = index.flush().await {
                slog::warn!(
                    context.logger, "Unable to flush buffered grants on shutdown";
                    replisdk::utils::error::slog::ErrorAttributes::from(&error),
                );
            }
        }
        result
    }
}

/// Initialise the index client and its bulk worker.
async fn index(context: &Context, generic: &GenericInit) -> Result<(Index, BulkWorker)> {
    let conf = &generic.conf.index;
    if !conf.enabled {
        anyhow::bail!(breakglass_index::error::BackendDisabled);
    }
    let backend = generic
        .index_factory()?
        .backend(IndexFactoryArgs {
            conf: &conf.options,
            context,
        })
        .await?;
    Index::new(context, backend, conf)
}

/// Initialise the resource authorizer and the sweeper for the cache it shares.
async fn resource_auth(
    context: &Context,
    conf: &ResourceAuthConf,
) -> Result<Option<(Arc<ResourceAuthorizer>, Sweeper)>> {
    let cache = Arc::new(ResourceAuthCache::new(conf.clone()));
    let bypass = Arc::new(BypassFlag::load(context, conf).await?);
    let authorizer =
        ResourceAuthorizer::from_conf(conf, Arc::clone(&cache), Arc::clone(&bypass))?;
    let authorizer = match authorizer {
        None => return Ok(None),
        Some(authorizer) => Arc::new(authorizer),
    };
    let sweeper = Sweeper::new(context, cache, bypass);
    Ok(Some((authorizer, sweeper)))
}

#[cfg(test)]
mod tests {
    use breakglass_context::Context;
    use breakglass_resauth::ResourceAuthConf;

    const PUBLIC: &str = "crn:v1:bluemix:public:cos:global:a/1:inst:bucket:b1";

    #[tokio::test]
    async fn resource_auth_disabled_without_policy() {
        let context = Context::fixture();
        let conf = ResourceAuthConf::default();
        let wiring = super::resource_auth(&context, &conf).await.unwrap();
        assert!(wiring.is_none());
    }

    #[tokio::test]
    async fn resource_auth_shares_cache_with_sweeper() {
        let context = Context::fixture();
        let mut conf = ResourceAuthConf {
            public_resources: vec!["crn:v1:bluemix:public:cos:*".to_string()],
            ..Default::default()
        };
        conf.policy.url = "https://servicenow.example.com/api/authorize".into();
        conf.policy.api_key = Some("snow-api-key".into());

        let (authorizer, _sweeper) = super::resource_auth(&context, &conf)
            .await
            .unwrap()
            .unwrap();
        let decisions = authorizer
            .authorize(&context, "e", &[PUBLIC.to_string()])
            .await
            .unwrap();
        assert!(decisions[PUBLIC]);
        assert_eq!(authorizer.cache().lookup("e", PUBLIC), Some(true));
    }
}
