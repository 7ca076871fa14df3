//! Payloads returned by the Falcon API.
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// Generic envelope shared by the Falcon query and entity endpoints.
/// ```json
/// {
///   "meta": { "query_time": 0.01, "pagination": { "offset": "...", "total": 2 }, "trace_id": "..." },
///   "resources": [ ... ],
///   "errors": []
/// }
/// ```
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    #[serde(default)]
    pub(crate) meta: Meta,
    pub(crate) resources: Option<Vec<T>>,
    pub(crate) errors: Option<Vec<ApiErrorEntry>>,
}

impl<T> ApiResponse<T> {
    pub(crate) fn into_resources(self) -> Vec<T> {
        self.resources.unwrap_or_default()
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Meta {
    #[serde(default)]
    pub(crate) pagination: Option<Pagination>,
    #[serde(default)]
    pub(crate) trace_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Pagination {
    #[serde(default)]
    pub(crate) offset: Option<PageOffset>,
    #[serde(default)]
    pub(crate) total: u64,
}

/// Pagination offset. The scroll API returns an opaque continuation token while the host group
/// members API uses numeric offsets.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PageOffset {
    Index(u64),
    Token(String),
}

impl Display for PageOffset {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::Token(token) => write!(f, "{token}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiErrorEntry {
    #[serde(default)]
    pub code: Option<u16>,
    #[serde(default)]
    pub message: String,
}

impl Display for ApiErrorEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} ({code})", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Joins the error messages of a response, if any.
pub(crate) fn join_errors(errors: &[ApiErrorEntry]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub(crate) access_token: String,
    pub(crate) expires_in: i64,
    #[serde(default)]
    pub(crate) token_type: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct HostGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub group_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct PutFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub sha256: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub description: Option<String>,
}

/// POST /real-time-response/combined/batch-init-session/v1
#[derive(Debug, Deserialize)]
pub(crate) struct BatchInitResponse {
    #[serde(default)]
    pub(crate) batch_id: String,
    #[serde(default)]
    pub(crate) resources: HashMap<String, SessionEntry>,
    #[serde(default)]
    pub(crate) errors: Option<Vec<ApiErrorEntry>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SessionEntry {
    #[serde(default)]
    pub(crate) session_id: String,
    #[serde(default)]
    pub(crate) offline_queued: bool,
    #[serde(default)]
    pub(crate) errors: Option<Vec<ApiErrorEntry>>,
}

/// POST /real-time-response/combined/batch-{active-responder,admin}-command/v1
#[derive(Debug, Deserialize)]
pub(crate) struct BatchCommandResponse {
    #[serde(default)]
    pub(crate) combined: CombinedResources,
    #[serde(default)]
    pub(crate) errors: Option<Vec<ApiErrorEntry>>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct CombinedResources {
    #[serde(default)]
    pub(crate) resources: HashMap<String, CommandEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommandEntry {
    #[serde(default)]
    pub(crate) complete: bool,
    #[serde(default)]
    pub(crate) offline_queued: bool,
    #[serde(default)]
    pub(crate) stderr: String,
    #[serde(default)]
    pub(crate) errors: Option<Vec<ApiErrorEntry>>,
}

/*
    Batch command host entry example:
    {
      "aid": "0123456789abcdef0123456789abcdef",
      "base_command": "put",
      "complete": false,
      "errors": null,
      "offline_queued": true,
      "query_time": 0,
      "session_id": "7f4b0a5e-...",
      "stderr": "",
      "stdout": "",
      "task_id": "e3b0c442-..."
    }
*/
