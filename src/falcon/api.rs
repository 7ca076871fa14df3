use crate::falcon::auth::AuthError;
use crate::falcon::response::{HostGroup, PageOffset, PutFile};
use crate::http::client::HttpClientError;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// An enumeration of the errors the Falcon API calls can return.
#[derive(Error, Debug)]
pub enum FalconApiError {
    #[error("authentication error: `{0}`")]
    Auth(#[from] AuthError),
    #[error("http client error: `{0}`")]
    HttpClient(#[from] HttpClientError),
    #[error("`{endpoint}` responded with status `{status}`: `{message}`")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },
    #[error("unable to deserialize the response from `{0}`: `{1}`")]
    Deserialize(String, String),
    #[error("invalid request url: `{0}`")]
    InvalidUrl(String),
    #[error("`{0}` returned no resources")]
    NoResources(String),
}

impl FalconApiError {
    /// Transport failures, rate limiting and server errors are worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpClient(HttpClientError::TransportError(_)) => true,
            Self::Api { status, .. } => *status == 429 || (500..=599).contains(status),
            _ => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::Api { status: 429, .. })
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api { status: 401, .. })
    }
}

/// Which hosts receive the HOSTS file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Scope {
    /// Every host in the customer tenant.
    Cid,
    /// Members of a single host group.
    HostGroup,
}

#[derive(Error, Debug, PartialEq)]
#[error("the scope needs to be 'cid' or 'hostgroup', got `{0}`")]
pub struct InvalidScope(String);

impl FromStr for Scope {
    type Err = InvalidScope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cid" => Ok(Self::Cid),
            "hostgroup" => Ok(Self::HostGroup),
            _ => Err(InvalidScope(s.to_string())),
        }
    }
}

impl TryFrom<String> for Scope {
    type Error = InvalidScope;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cid => write!(f, "cid"),
            Self::HostGroup => write!(f, "hostgroup"),
        }
    }
}

/// Query for one page of host ids.
#[derive(Debug, Clone, PartialEq)]
pub struct HostQuery {
    pub scope: Scope,
    pub scope_id: String,
    pub filter: String,
    pub limit: u32,
    pub offset: Option<PageOffset>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HostIdPage {
    pub ids: Vec<String>,
    pub total: u64,
    pub next_offset: Option<PageOffset>,
}

/// RTR permission level required by a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandLevel {
    /// Active responder commands such as `cd` and `mv`.
    Responder,
    /// Admin commands such as `put`.
    Admin,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchCommand {
    pub level: CommandLevel,
    pub batch_id: String,
    pub base_command: String,
    pub command_string: String,
    pub timeout: Duration,
}

impl BatchCommand {
    pub fn new(level: CommandLevel, batch_id: &str, command_string: String, timeout: Duration) -> Self {
        let base_command = command_string
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            level,
            batch_id: batch_id.to_string(),
            base_command,
            command_string,
            timeout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchSession {
    pub batch_id: String,
    pub hosts: HashMap<String, HostSession>,
    /// Errors reported for the whole batch.
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HostSession {
    pub session_id: String,
    pub offline_queued: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchCommandResult {
    pub hosts: HashMap<String, HostCommandResult>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct HostCommandResult {
    pub complete: bool,
    pub offline_queued: bool,
    pub stderr: String,
    pub errors: Vec<String>,
}

impl HostCommandResult {
    /// Returns the failure reason, if the command failed on the host.
    pub fn failure(&self) -> Option<String> {
        if !self.errors.is_empty() {
            return Some(self.errors.join("; "));
        }
        let stderr = self.stderr.trim();
        (!stderr.is_empty()).then(|| stderr.to_string())
    }
}

/// Falcon API operations needed to push the HOSTS file.
#[cfg_attr(test, mockall::automock)]
pub trait FalconApi {
    /// Returns the CID with checksum (CCID) of the authenticated tenant.
    fn sensor_ccid(&self) -> Result<String, FalconApiError>;

    /// Returns the host group with the provided id, if it exists.
    fn host_group(&self, id: &str) -> Result<Option<HostGroup>, FalconApiError>;

    /// Returns a page of host ids matching the query.
    fn query_host_ids(&self, query: &HostQuery) -> Result<HostIdPage, FalconApiError>;

    /// Returns the put files in the RTR library with the provided name.
    fn put_files(&self, name: &str) -> Result<Vec<PutFile>, FalconApiError>;

    /// Opens an RTR batch session with the provided hosts.
    fn batch_init_session(
        &self,
        host_ids: &[String],
        queue_offline: bool,
        timeout: Duration,
    ) -> Result<BatchSession, FalconApiError>;

    /// Runs a command on every host in the batch.
    fn batch_command(&self, command: &BatchCommand) -> Result<BatchCommandResult, FalconApiError>;

    /// Revokes the token in use.
    fn revoke(&self) -> Result<(), FalconApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_scope_parse() {
        assert_eq!("cid".parse::<Scope>().unwrap(), Scope::Cid);
        assert_eq!("CID".parse::<Scope>().unwrap(), Scope::Cid);
        assert_eq!("HostGroup".parse::<Scope>().unwrap(), Scope::HostGroup);
        assert_matches!("host_group".parse::<Scope>(), Err(InvalidScope(_)));
    }

    #[test]
    fn test_batch_command_base_command() {
        let command = BatchCommand::new(
            CommandLevel::Responder,
            "batch",
            "mv hosts hosts.2023-12-06-10-00-00.backup".to_string(),
            Duration::from_secs(30),
        );
        assert_eq!(command.base_command, "mv");
    }

    #[test]
    fn test_retryable_errors() {
        let api_error = |status| FalconApiError::Api {
            endpoint: "/".to_string(),
            status,
            message: String::new(),
        };
        assert!(api_error(429).is_retryable());
        assert!(api_error(503).is_retryable());
        assert!(!api_error(400).is_retryable());
        assert!(api_error(429).is_rate_limited());
        assert!(!api_error(503).is_rate_limited());
        assert!(api_error(401).is_unauthorized());
        assert!(
            FalconApiError::HttpClient(HttpClientError::TransportError("reset".to_string()))
                .is_retryable()
        );
        assert!(
            !FalconApiError::Deserialize("/".to_string(), "eof".to_string()).is_retryable()
        );
    }

    #[test]
    fn test_host_command_failure() {
        let ok = HostCommandResult {
            complete: true,
            ..Default::default()
        };
        assert_eq!(ok.failure(), None);

        let stderr = HostCommandResult {
            stderr: "The system cannot find the file specified.\n".to_string(),
            ..Default::default()
        };
        assert_eq!(
            stderr.failure(),
            Some("The system cannot find the file specified.".to_string())
        );

        let errors = HostCommandResult {
            errors: vec!["session expired".to_string(), "retry".to_string()],
            stderr: "ignored".to_string(),
            ..Default::default()
        };
        assert_eq!(errors.failure(), Some("session expired; retry".to_string()));
    }
}
