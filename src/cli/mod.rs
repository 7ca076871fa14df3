pub mod error;
pub mod one_shot_operation;

use crate::config::{PushHostsConfig, PushHostsConfigLoader};
use crate::logging::config::{FileLoggerGuard, LogLevel};
use crate::utils::binary_metadata::binary_metadata;
use clap::Parser;
use error::CliError;
use one_shot_operation::OneShotCommand;
use std::path::PathBuf;
use tracing::debug;

/// Everything needed to push the HOSTS file.
pub struct PushHostsRun {
    pub config: PushHostsConfig,
    pub dry_run: bool,
    /// Keeps the log file writer alive while the run lasts.
    pub file_logger_guard: FileLoggerGuard,
}

/// What action was requested from the CLI?
pub enum CliCommand {
    /// Push the HOSTS file with the resolved configuration.
    PushHosts(PushHostsRun),
    /// Do an "one-shot" operation and exit successfully.
    OneShot(OneShotCommand),
}

/// Push a HOSTS file to Windows hosts through CrowdStrike Falcon Real Time Response.
#[derive(Parser, Debug)]
#[command(author, about, long_about = None)] // Read from `Cargo.toml`
pub struct Cli {
    /// Falcon API client id
    #[arg(long = "falcon_client_id", env = "FALCON_CLIENT_ID")]
    falcon_client_id: Option<String>,

    /// Falcon API client secret
    #[arg(
        long = "falcon_client_secret",
        env = "FALCON_CLIENT_SECRET",
        hide_env_values = true
    )]
    falcon_client_secret: Option<String>,

    /// Hosts in scope: `cid` or `hostgroup`
    #[arg(long)]
    scope: Option<String>,

    /// CID or host group id, depending on the scope
    #[arg(long = "scope_id")]
    scope_id: Option<String>,

    /// Falcon cloud: auto, us1, us2, eu1, usgov1, usgov2 or an https url
    #[arg(short = 'b', long = "base_url")]
    base_url: Option<String>,

    /// Child CID for Flight Control (MSSP) tenants
    #[arg(long = "member_cid")]
    member_cid: Option<String>,

    /// Expected SHA256 of the put file
    #[arg(long = "put_file_sha256")]
    put_file_sha256: Option<String>,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run the verifications and list the hosts without starting RTR sessions
    #[arg(long)]
    dry_run: bool,

    /// Log level: trace, debug, info, warn or error
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Print version information and exit
    #[arg(long)]
    version: bool,
}

impl Cli {
    /// Parses command line arguments and decides how the application runs
    pub fn init() -> Result<CliCommand, CliError> {
        let cli = Self::try_parse()?;

        if cli.print_version() {
            return Ok(CliCommand::OneShot(OneShotCommand::PrintVersion));
        }

        let dry_run = cli.dry_run;
        let config = cli.config_loader().load()?;

        let file_logger_guard = config.log.try_init()?;
        debug!("{}", binary_metadata());
        debug!(?config, "Configuration loaded");

        Ok(CliCommand::PushHosts(PushHostsRun {
            config,
            dry_run,
            file_logger_guard,
        }))
    }

    /// Flags take priority over every other configuration source.
    fn config_loader(self) -> PushHostsConfigLoader {
        PushHostsConfigLoader::new(self.config)
            .with_override("falcon.client_id", self.falcon_client_id)
            .with_override("falcon.client_secret", self.falcon_client_secret)
            .with_override("falcon.member_cid", self.member_cid)
            .with_override("falcon.base_url", self.base_url)
            .with_override("scope", self.scope)
            .with_override("scope_id", self.scope_id)
            .with_override("put_file.sha256", self.put_file_sha256)
            .with_override("log.level", self.log_level.map(|level| level.to_string()))
    }

    fn print_version(&self) -> bool {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::falcon::api::Scope;
    use crate::falcon::cloud::FalconCloud;
    use clap::CommandFactory;
    use std::collections::HashMap;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "pushhosts",
            "--falcon_client_id",
            "id",
            "--falcon_client_secret",
            "secret",
            "--scope",
            "hostgroup",
            "--scope_id",
            "group-1",
            "-b",
            "usgov2",
            "--member_cid",
            "child",
            "--log-level",
            "debug",
            "--dry-run",
        ])
        .unwrap();
        assert!(cli.dry_run);

        let config = cli
            .config_loader()
            .with_environment(HashMap::new())
            .load()
            .unwrap();

        assert_eq!(config.scope, Scope::HostGroup);
        assert_eq!(config.scope_id, "group-1");
        assert_eq!(config.falcon.base_url, FalconCloud::UsGov2);
        assert_eq!(config.falcon.member_cid.as_deref(), Some("child"));
        assert_eq!(config.log.level.to_string(), "debug");
    }

    #[test]
    fn test_invalid_log_level_is_usage_error() {
        let result = Cli::try_parse_from(["pushhosts", "--log-level", "verbose"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_version_flag() {
        let cli = Cli::try_parse_from(["pushhosts", "--version"]).unwrap();
        assert!(cli.print_version());
    }
}
