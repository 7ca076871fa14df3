use crate::config::PushHostsConfigError;
use crate::falcon::api::FalconApiError;
use crate::logging::config::LoggingError;
use crate::push::error::PushError;
use std::process::ExitCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(#[from] clap::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] PushHostsConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to initialize logs: {0}")]
    LoggingInit(#[from] LoggingError),

    #[error("failed to start the push: {0}")]
    Precondition(String),

    #[error("{0}")]
    Command(String),
}

impl From<PushError> for CliError {
    fn from(err: PushError) -> Self {
        if err.is_precondition() {
            Self::Precondition(err.to_string())
        } else {
            Self::Command(err.to_string())
        }
    }
}

impl From<FalconApiError> for CliError {
    fn from(err: FalconApiError) -> Self {
        PushError::from(err).into()
    }
}

impl From<CliError> for ExitCode {
    /// Converts the error to an exit code.
    ///
    /// We comply with the [Advanced Bash Scripting Guide] and
    /// [BSD guidelines] for the exit codes.
    ///
    /// [Advanced Bash Scripting Guide]: https://tldp.org/LDP/abs/html/exitcodes.html
    /// [BSD guidelines]: https://man.freebsd.org/cgi/man.cgi?query=sysexits&manpath=FreeBSD+4.3-RELEASE
    fn from(value: CliError) -> Self {
        match value {
            // `--help` is reported through clap errors that are not printed to stderr.
            CliError::Usage(err) if !err.use_stderr() => Self::SUCCESS,
            CliError::Usage(_) | CliError::Config(_) | CliError::InvalidConfig(_) => Self::from(64),
            CliError::Precondition(_) => Self::from(69),
            CliError::LoggingInit(_) => Self::from(70),
            CliError::Command(_) => Self::from(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::falcon::auth::AuthError;

    #[test]
    fn test_push_error_classification() {
        let auth: CliError =
            PushError::Api(FalconApiError::Auth(AuthError::Rejected(401, "denied".into()))).into();
        assert!(matches!(auth, CliError::Precondition(_)));

        let mismatch: CliError = PushError::ScopeMismatch {
            expected: "A".into(),
            actual: "B".into(),
        }
        .into();
        assert!(matches!(mismatch, CliError::Precondition(_)));

        let forbidden: CliError = PushError::Api(FalconApiError::Api {
            endpoint: "/sensors/queries/installers/ccid/v1".into(),
            status: 403,
            message: "access denied".into(),
        })
        .into();
        assert_eq!(ExitCode::from(forbidden), ExitCode::from(69));

        let batch: CliError = PushError::BatchInitFailed("no batch id".into()).into();
        assert!(matches!(batch, CliError::Command(_)));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            ExitCode::from(CliError::InvalidConfig("bad".into())),
            ExitCode::from(64)
        );
        assert_eq!(
            ExitCode::from(CliError::Precondition("cid".into())),
            ExitCode::from(69)
        );
        assert_eq!(
            ExitCode::from(CliError::LoggingInit(LoggingError::LogFilePathNotDefined)),
            ExitCode::from(70)
        );
        assert_eq!(
            ExitCode::from(CliError::Command("put".into())),
            ExitCode::from(1)
        );
    }
}
