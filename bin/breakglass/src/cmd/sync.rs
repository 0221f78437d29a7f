//! Initialise the grants index.
use anyhow::Result;

use breakglass_conf::Conf;

use super::Cli;
use crate::init::Sync;

/// Create the grants index so the server can persist grants.
pub async fn run(_cli: Cli, conf: Conf) -> Result<()> {
    Sync::configure(conf)
        .await?
        .register_default_backends()
        .run()
        .await
}
