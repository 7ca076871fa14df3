use super::config::LoggingError;
use serde::Deserialize;
use std::path::PathBuf;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};

#[derive(Debug, Deserialize, Default, PartialEq, Clone)]
pub struct FileLoggingConfig {
    #[serde(default)]
    pub(crate) enable: bool,
    #[serde(default)]
    pub(crate) path: Option<LogFilePath>,
}

impl FileLoggingConfig {
    /// Returns the non blocking writer for the log file and its guard, if file logging is
    /// enabled. Files are rotated daily.
    pub(super) fn setup(self) -> Result<Option<(NonBlocking, WorkerGuard)>, LoggingError> {
        if !self.enable {
            return Ok(None);
        }

        let path = self.path.ok_or(LoggingError::LogFilePathNotDefined)?;
        let file_appender = tracing_appender::rolling::daily(path.parent, path.file_name);
        Ok(Some(tracing_appender::non_blocking(file_appender)))
    }
}

#[derive(Debug, Deserialize, PartialEq, Clone)]
#[serde(try_from = "PathBuf")]
pub struct LogFilePath {
    parent: PathBuf,
    file_name: PathBuf,
}

impl TryFrom<PathBuf> for LogFilePath {
    type Error = LoggingError;

    fn try_from(value: PathBuf) -> Result<Self, Self::Error> {
        let parent = value
            .parent()
            .ok_or(LoggingError::InvalidFilePath(
                "file path provided must have a valid parent directory".into(),
            ))?
            .into();
        let file_name = value
            .file_name()
            .ok_or(LoggingError::InvalidFilePath(
                "file path provided must have a valid file name".into(),
            ))?
            .into();
        Ok(Self { parent, file_name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_log_file_path() {
        let path = LogFilePath::try_from(PathBuf::from("/var/log/pushhosts/pushhosts.log")).unwrap();
        assert_eq!(path.parent, PathBuf::from("/var/log/pushhosts"));
        assert_eq!(path.file_name, PathBuf::from("pushhosts.log"));

        assert_matches!(
            LogFilePath::try_from(PathBuf::from("/")),
            Err(LoggingError::InvalidFilePath(_))
        );
    }

    #[test]
    fn test_disabled_file_logging_has_no_writer() {
        let config = FileLoggingConfig::default();
        assert!(config.setup().unwrap().is_none());
    }

    #[test]
    fn test_enabled_file_logging_requires_path() {
        let config = FileLoggingConfig {
            enable: true,
            path: None,
        };
        assert_matches!(config.setup(), Err(LoggingError::LogFilePathNotDefined));
    }

    #[test]
    fn test_enabled_file_logging() {
        let dir = tempfile::tempdir().unwrap();
        let config = FileLoggingConfig {
            enable: true,
            path: Some(LogFilePath::try_from(dir.path().join("pushhosts.log")).unwrap()),
        };
        assert!(config.setup().unwrap().is_some());
    }
}
