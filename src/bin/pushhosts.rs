//! Entry point of the `pushhosts` command.
//!
//! Parses the command line, then either performs a one-shot action or pushes the HOSTS file.
use pushhosts::cli::error::CliError;
use pushhosts::cli::{Cli, CliCommand};
use pushhosts::run::run;
use std::process::ExitCode;
use tracing::error;

fn main() -> ExitCode {
    let push_run = match Cli::init() {
        Ok(CliCommand::OneShot(op)) => {
            op.run_one_shot();
            return ExitCode::SUCCESS;
        }
        Ok(CliCommand::PushHosts(push_run)) => push_run,
        Err(CliError::Usage(err)) => {
            // clap formats usage errors and help itself.
            let _ = err.print();
            return CliError::Usage(err).into();
        }
        Err(err) => {
            // Logging is not initialized yet.
            eprintln!("{err}");
            return err.into();
        }
    };

    match run(&push_run.config, push_run.dry_run) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            err.into()
        }
    }
}
