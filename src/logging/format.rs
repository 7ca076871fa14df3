use crate::defaults::LOG_TIMESTAMP_FORMAT;
use serde::Deserialize;

/// Represents a custom time stamp format for logging.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct TimestampFormat(pub(crate) String);

/// Timestamps follow
/// [chrono strftime](https://docs.rs/chrono/latest/chrono/format/strftime/index.html)
/// and are rendered in UTC. The default is "%Y-%m-%d %H:%M:%S".
impl Default for TimestampFormat {
    fn default() -> Self {
        Self(LOG_TIMESTAMP_FORMAT.to_string())
    }
}

/// Defines the format to be used for logging, including target and timestamp.
///
/// # Fields:
/// - `target`: whether the target of the trace event is included in the formatted output.
/// - `timestamp`: the `TimestampFormat` used for every event.
#[derive(Debug, Deserialize, PartialEq, Clone, Default)]
pub struct LoggingFormat {
    #[serde(default)]
    pub(crate) target: bool,
    #[serde(default)]
    pub(crate) timestamp: TimestampFormat,
}
