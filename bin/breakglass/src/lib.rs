//! Combine the break-glass components to initialise and run a process.
use anyhow::Result;
use clap::Parser;

use breakglass_conf::Conf;

mod cmd;
mod init;

pub use self::cmd::Cli;
pub use self::init::Services;

/// Initialise the process and invoke a command implementation.
pub async fn execute(cli: Cli, conf: Conf) -> Result<()> {
    match cli.command {
        cmd::Command::CheckConf => cmd::check_conf::run(cli, conf).await,
        cmd::Command::Server => cmd::server::run(cli, conf).await,
        cmd::Command::Sync => cmd::sync::run(cli, conf).await,
    }
}

/// Initialise the async runtime for the process and invoke [`execute`].
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let conf = breakglass_conf::load(&cli.config)?;
    conf.runtime
        .tokio
        .clone()
        .into_runtime()
        .expect("failed tokio runtime initialisation")
        .block_on(execute(cli, conf))
}
