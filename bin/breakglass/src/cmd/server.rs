//! Run the break-glass cache server.
use anyhow::Result;

use breakglass_conf::Conf;

use super::Cli;
use crate::init::Server;

/// Restore grants, then run the cache background tasks until shutdown.
pub async fn run(_cli: Cli, conf: Conf) -> Result<()> {
    Server::configure(conf)
        .await?
        .register_default_backends()
        .run()
        .await
}
