//! Validate the process configuration.
use anyhow::Result;

use breakglass_conf::Conf;

use super::Cli;
use crate::init::GenericInit;

/// Validate the configuration and exit.
pub async fn run(_cli: Cli, conf: Conf) -> Result<()> {
    let mut generic = GenericInit::configure(conf).await?;
    generic.register_default_backends();
    let context = generic.context();
    generic.validate_conf(&context)?;
    slog::info!(context.logger, "Configuration is valid");
    Ok(())
}
