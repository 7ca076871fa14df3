use super::file_logging::FileLoggingConfig;
use super::format::LoggingFormat;
use crate::defaults::LOG_LEVEL_ENV_VAR;
use serde::Deserialize;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// An enum representing possible errors during the logging initialization.
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("init logging error: `{0}`")]
    TryInitError(String),
    #[error("invalid logging file path: `{0}`")]
    InvalidFilePath(String),
    #[error("logging file path not defined")]
    LogFilePathNotDefined,
}

/// Defines the logging configuration.
#[derive(Debug, Deserialize, PartialEq, Clone, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub(crate) level: LogLevel,
    #[serde(default)]
    pub(crate) format: LoggingFormat,
    #[serde(default)]
    pub(crate) file: FileLoggingConfig,
}

pub type FileLoggerGuard = Option<WorkerGuard>;

impl LoggingConfig {
    /// Attempts to initialize the global logging subscriber. The returned guard flushes the
    /// log file when dropped, so it needs to live until the process ends.
    pub fn try_init(&self) -> Result<FileLoggerGuard, LoggingError> {
        let target = self.format.target;
        let timestamp_fmt = self.format.timestamp.0.clone();

        let (file_layer, guard) =
            self.file
                .clone()
                .setup()?
                .map_or(Default::default(), |(file_writer, guard)| {
                    let file_layer = tracing_subscriber::fmt::layer()
                        .with_writer(file_writer)
                        .with_ansi(false)
                        .with_target(target)
                        .with_timer(ChronoUtc::new(timestamp_fmt.clone()))
                        .with_filter(self.logging_filter());
                    (Some(file_layer), Some(guard))
                });

        let console_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(target)
            .with_timer(ChronoUtc::new(timestamp_fmt))
            .with_filter(self.logging_filter());

        tracing_subscriber::Registry::default()
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .map_err(|_| {
                LoggingError::TryInitError("unable to set global logging subscriber".to_string())
            })?;

        debug!("Logging initialized successfully");
        Ok(guard)
    }

    /// Events from this crate are filtered by the configured level. The `LOG_LEVEL`
    /// environment variable, when set, replaces it with any directives.
    fn logging_filter(&self) -> EnvFilter {
        EnvFilter::builder()
            .with_default_directive(self.level.crate_directive())
            .with_env_var(LOG_LEVEL_ENV_VAR)
            .from_env_lossy()
    }
}

/// Wraps [Level] so it can be read from configuration and command line flags.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct LogLevel(Level);

impl LogLevel {
    pub fn as_level(&self) -> Level {
        self.0
    }

    fn crate_directive(&self) -> tracing_subscriber::filter::Directive {
        // A `crate=level` directive built from a valid level always parses.
        format!("{}={}", env!("CARGO_CRATE_NAME"), self.0.as_str().to_lowercase())
            .parse()
            .unwrap_or_else(|_| LevelFilter::from_level(self.0).into())
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self(Level::INFO)
    }
}

impl FromStr for LogLevel {
    type Err = tracing::metadata::ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::from_str(s).map(LogLevel)
    }
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.as_str().to_lowercase())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value_str = String::deserialize(deserializer)?;
        Level::from_str(&value_str)
            .map(LogLevel)
            .map_err(serde::de::Error::custom)
    }
}
