//! Index synchronisation process as a builder.
use anyhow::Result;

use breakglass_conf::Conf;
use breakglass_index::error::NoCredentials;
use breakglass_index::IndexFactorySyncArgs;

use super::generic::GenericInit;

/// Process builder to create or update the indices used by the cache.
pub struct Sync {
    /// Process initialisation logic common to all commands.
    generic: GenericInit,
}

impl Sync {
    /// Build an index sync process from the loaded configuration.
    pub async fn configure(conf: Conf) -> Result<Self> {
        let generic = GenericInit::configure(conf).await?;
        Ok(Self { generic })
    }

    /// Register all supported backends.
    pub fn register_default_backends(mut self) -> Self {
        self.generic.register_default_backends();
        self
    }

    /// Create or update indices with the first credential the index accepts.
    pub async fn run(self) -> Result<()> {
        let context = self.generic.context();
        self.generic.validate_conf(&context)?;

        let conf = &self.generic.conf;
        let factory = self.generic.index_factory()?;
        let indices = [breakglass_grants::document::index_definition(
            &conf.grants.index,
        )];
        for credential in &conf.index.credentials {
            let args = IndexFactorySyncArgs {
                conf: &conf.index.options,
                context: &context,
                credential,
                indices: &indices,
            };
            match factory.sync(args).await {
                Ok(()) => {
                    slog::info!(
                        context.logger, "Index synchronisation complete";
                        "credential" => &credential.name,
                    );
                    return Ok(());
                }
                Err(error) if breakglass_index::error::is_unauthorized(&error) => {
                    slog::warn!(
                        context.logger, "Index rejected credential, trying the next one";
                        "credential" => &credential.name,
                    );
                }
                Err(error) => return Err(error),
            }
        }
        anyhow::bail!(NoCredentials)
    }
}
