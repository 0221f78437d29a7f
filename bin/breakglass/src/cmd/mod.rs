//! Built-in `breakglass` commands.
use clap::Parser;
use clap::Subcommand;

pub mod check_conf;
pub mod server;
pub mod sync;

/// Break-glass authorisation cache with write-through persistence.
#[derive(Debug, Parser)]
#[command(version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file to use.
    #[arg(
        short = 'c',
        long = "config",
        default_value_t = String::from(breakglass_conf::DEFAULT_PATH),
    )]
    pub config: String,

    /// Select the command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Select the command to run.
#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Validate the configuration and exit.
    #[command(alias = "validate")]
    CheckConf,

    /// Restore grants, then run the cache background tasks until shutdown.
    #[command(alias = "run")]
    Server,

    /// Create the grants index so the server can persist grants.
    #[command(alias = "sync-index")]
    Sync,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;
    use super::Command;

    #[test]
    fn default_config_path() {
        let cli = Cli::parse_from(["breakglass", "server"]);
        assert_eq!(cli.config, "breakglass.yaml");
        assert!(matches!(cli.command, Command::Server));
    }

    #[test]
    fn check_conf_command() {
        let cli = Cli::parse_from(["breakglass", "-c", "/etc/bg.yaml", "check-conf"]);
        assert_eq!(cli.config, "/etc/bg.yaml");
        assert!(matches!(cli.command, Command::CheckConf));
    }
}
