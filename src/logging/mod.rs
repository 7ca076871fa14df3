//! Logging setup based on `tracing`.
//!
//! Events are written to stdout and, when enabled, to a daily rolling file.
pub mod config;
pub mod file_logging;
pub mod format;
