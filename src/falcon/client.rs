use crate::falcon::api::{
    BatchCommand, BatchCommandResult, BatchSession, CommandLevel, FalconApi, FalconApiError,
    HostCommandResult, HostIdPage, HostQuery, HostSession, Scope,
};
use crate::falcon::auth::{Authenticator, Token, TokenCache};
use crate::falcon::cloud::FalconCloud;
use crate::falcon::response::{
    join_errors, ApiErrorEntry, ApiResponse, BatchCommandResponse, BatchInitResponse, HostGroup,
    PutFile,
};
use crate::http::client::{HttpClient, HttpClientError};
use crate::utils::retry::retry_if;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::{Method, Request, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const CCID_PATH: &str = "/sensors/queries/installers/ccid/v1";
pub const HOST_GROUPS_PATH: &str = "/devices/entities/host-groups/v1";
pub const DEVICES_SCROLL_PATH: &str = "/devices/queries/devices-scroll/v1";
pub const HOST_GROUP_MEMBERS_PATH: &str = "/devices/queries/host-group-members/v1";
pub const PUT_FILES_QUERY_PATH: &str = "/real-time-response/queries/put-files/v1";
pub const PUT_FILES_ENTITIES_PATH: &str = "/real-time-response/entities/put-files/v1";
pub const BATCH_INIT_SESSION_PATH: &str = "/real-time-response/combined/batch-init-session/v1";
pub const BATCH_RESPONDER_COMMAND_PATH: &str =
    "/real-time-response/combined/batch-active-responder-command/v1";
pub const BATCH_ADMIN_COMMAND_PATH: &str = "/real-time-response/combined/batch-admin-command/v1";

const JSON_CONTENT_TYPE: &str = "application/json";

/// How failed requests are retried.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub interval: Duration,
}

/// Falcon API client authenticated with a bearer token.
///
/// The token is obtained when connecting and refreshed on demand. When the configured cloud is
/// [FalconCloud::Auto] the client follows the region reported by the token endpoint.
pub struct FalconClient<C, A>
where
    C: HttpClient,
    A: Authenticator,
{
    http_client: C,
    authenticator: A,
    base_url: String,
    token_cache: TokenCache,
    retry_policy: RetryPolicy,
}

impl<C, A> FalconClient<C, A>
where
    C: HttpClient,
    A: Authenticator,
{
    /// Authenticates and returns a client ready to call the API.
    pub fn try_connect(
        http_client: C,
        authenticator: A,
        cloud: &FalconCloud,
        retry_policy: RetryPolicy,
    ) -> Result<Self, FalconApiError> {
        let mut base_url = cloud.base_url();
        let authentication = authenticator.authenticate(&base_url)?;

        if cloud.is_auto() {
            match authentication
                .region
                .as_deref()
                .and_then(FalconCloud::from_region)
            {
                Some(region) => {
                    info!(%region, "Falcon cloud region discovered");
                    base_url = region.base_url();
                }
                None => debug!(%base_url, "No cloud region reported, keeping default"),
            }
        }

        Ok(Self {
            http_client,
            authenticator,
            base_url,
            token_cache: TokenCache::new(authentication.token),
            retry_policy,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn token(&self) -> Result<Token, FalconApiError> {
        Ok(self.token_cache.get_or_refresh(|| {
            Ok(self.authenticator.authenticate(&self.base_url)?.token)
        })?)
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> Result<Url, FalconApiError> {
        Url::parse_with_params(&format!("{}{path}", self.base_url), params)
            .map_err(|err| FalconApiError::InvalidUrl(err.to_string()))
    }

    /// Performs the request, retrying the failures accepted by `should_retry`. An unauthorized
    /// response drops the cached token and is retried once with a fresh one.
    fn execute(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        body: Option<Vec<u8>>,
        should_retry: fn(&FalconApiError) -> bool,
    ) -> Result<Response<Vec<u8>>, FalconApiError> {
        let url = self.url(path, params)?;
        let mut token_refreshed = false;
        retry_if(
            self.retry_policy.max_attempts,
            self.retry_policy.interval,
            should_retry,
            || match self.send_authorized(&method, &url, path, &body) {
                Err(err) if err.is_unauthorized() && !token_refreshed => {
                    debug!(path, "Unauthorized response, refreshing the token");
                    token_refreshed = true;
                    self.token_cache.invalidate()?;
                    self.send_authorized(&method, &url, path, &body)
                }
                result => result,
            },
        )
    }

    fn send_authorized(
        &self,
        method: &Method,
        url: &Url,
        path: &str,
        body: &Option<Vec<u8>>,
    ) -> Result<Response<Vec<u8>>, FalconApiError> {
        let token = self.token()?;
        let mut builder = Request::builder()
            .method(method.clone())
            .uri(url.as_str())
            .header(AUTHORIZATION, token.bearer())
            .header(ACCEPT, JSON_CONTENT_TYPE);
        if body.is_some() {
            builder = builder.header(CONTENT_TYPE, JSON_CONTENT_TYPE);
        }
        let request = builder
            .body(body.clone().unwrap_or_default())
            .map_err(|err| HttpClientError::BuildingError(err.to_string()))?;

        debug!(%method, path, "Calling Falcon API");
        let response = self.http_client.send(request)?;
        if !response.status().is_success() {
            return Err(api_error(path, &response));
        }
        Ok(response)
    }

    fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, FalconApiError> {
        let response = self.execute(
            Method::GET,
            path,
            params,
            None,
            FalconApiError::is_retryable,
        )?;
        decode(path, &response)
    }

    /// RTR commands are not idempotent, only rate limited requests are sent again.
    fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        body: serde_json::Value,
    ) -> Result<T, FalconApiError> {
        let body = serde_json::to_vec(&body)
            .map_err(|err| HttpClientError::BuildingError(err.to_string()))?;
        let response = self.execute(
            Method::POST,
            path,
            params,
            Some(body),
            FalconApiError::is_rate_limited,
        )?;
        decode(path, &response)
    }
}

impl<C, A> FalconApi for FalconClient<C, A>
where
    C: HttpClient,
    A: Authenticator,
{
    fn sensor_ccid(&self) -> Result<String, FalconApiError> {
        let response: ApiResponse<String> = self.get(CCID_PATH, &[])?;
        response
            .into_resources()
            .into_iter()
            .next()
            .ok_or_else(|| FalconApiError::NoResources(CCID_PATH.to_string()))
    }

    fn host_group(&self, id: &str) -> Result<Option<HostGroup>, FalconApiError> {
        match self.get::<ApiResponse<HostGroup>>(HOST_GROUPS_PATH, &[("ids", id.to_string())]) {
            Ok(response) => Ok(response.into_resources().into_iter().next()),
            Err(FalconApiError::Api { status: 404, .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn query_host_ids(&self, query: &HostQuery) -> Result<HostIdPage, FalconApiError> {
        let mut params = vec![("limit", query.limit.to_string())];
        if !query.filter.is_empty() {
            params.push(("filter", query.filter.clone()));
        }
        let path = match query.scope {
            Scope::Cid => DEVICES_SCROLL_PATH,
            Scope::HostGroup => {
                params.push(("id", query.scope_id.clone()));
                HOST_GROUP_MEMBERS_PATH
            }
        };
        if let Some(offset) = &query.offset {
            params.push(("offset", offset.to_string()));
        }

        let response: ApiResponse<String> = self.get(path, &params)?;
        let (total, next_offset) = response
            .meta
            .pagination
            .as_ref()
            .map(|pagination| (pagination.total, pagination.offset.clone()))
            .unwrap_or_default();

        Ok(HostIdPage {
            ids: response.into_resources(),
            total,
            next_offset,
        })
    }

    fn put_files(&self, name: &str) -> Result<Vec<PutFile>, FalconApiError> {
        let ids: ApiResponse<String> =
            self.get(PUT_FILES_QUERY_PATH, &[("filter", format!("name:'{name}'"))])?;
        let ids = ids.into_resources();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let params: Vec<(&str, String)> = ids.into_iter().map(|id| ("ids", id)).collect();
        let files: ApiResponse<PutFile> = self.get(PUT_FILES_ENTITIES_PATH, &params)?;
        Ok(files.into_resources())
    }

    fn batch_init_session(
        &self,
        host_ids: &[String],
        queue_offline: bool,
        timeout: Duration,
    ) -> Result<BatchSession, FalconApiError> {
        let response: BatchInitResponse = self.post_json(
            BATCH_INIT_SESSION_PATH,
            &[("timeout", timeout.as_secs().to_string())],
            json!({
                "host_ids": host_ids,
                "queue_offline": queue_offline,
            }),
        )?;

        let hosts = response
            .resources
            .into_iter()
            .map(|(host_id, entry)| {
                let session = HostSession {
                    session_id: entry.session_id,
                    offline_queued: entry.offline_queued,
                    errors: error_messages(entry.errors),
                };
                (host_id, session)
            })
            .collect();

        Ok(BatchSession {
            batch_id: response.batch_id,
            hosts,
            errors: error_messages(response.errors),
        })
    }

    fn batch_command(&self, command: &BatchCommand) -> Result<BatchCommandResult, FalconApiError> {
        let path = match command.level {
            CommandLevel::Responder => BATCH_RESPONDER_COMMAND_PATH,
            CommandLevel::Admin => BATCH_ADMIN_COMMAND_PATH,
        };
        let response: BatchCommandResponse = self.post_json(
            path,
            &[("timeout", command.timeout.as_secs().to_string())],
            json!({
                "base_command": command.base_command,
                "batch_id": command.batch_id,
                "command_string": command.command_string,
            }),
        )?;

        if let Some(errors) = response.errors.as_deref().filter(|errors| !errors.is_empty()) {
            debug!(path, errors = join_errors(errors), "Batch command reported errors");
        }

        let hosts = response
            .combined
            .resources
            .into_iter()
            .map(|(host_id, entry)| {
                let result = HostCommandResult {
                    complete: entry.complete,
                    offline_queued: entry.offline_queued,
                    stderr: entry.stderr,
                    errors: error_messages(entry.errors),
                };
                (host_id, result)
            })
            .collect();

        Ok(BatchCommandResult { hosts })
    }

    fn revoke(&self) -> Result<(), FalconApiError> {
        if let Some(token) = self.token_cache.take()? {
            self.authenticator.revoke(&self.base_url, &token)?;
        }
        Ok(())
    }
}

fn error_messages(errors: Option<Vec<ApiErrorEntry>>) -> Vec<String> {
    errors
        .unwrap_or_default()
        .iter()
        .map(ToString::to_string)
        .collect()
}

fn decode<T: DeserializeOwned>(path: &str, response: &Response<Vec<u8>>) -> Result<T, FalconApiError> {
    serde_json::from_slice(response.body())
        .map_err(|err| FalconApiError::Deserialize(path.to_string(), err.to_string()))
}

/// Builds the error for an unsuccessful response, using the messages in the error envelope
/// when there are any.
fn api_error(path: &str, response: &Response<Vec<u8>>) -> FalconApiError {
    let envelope = serde_json::from_slice::<ApiResponse<serde_json::Value>>(response.body()).ok();
    if let Some(trace_id) = envelope.as_ref().and_then(|e| e.meta.trace_id.as_deref()) {
        debug!(path, trace_id, "Falcon API request failed");
    }
    let message = envelope
        .and_then(|envelope| envelope.errors)
        .filter(|errors| !errors.is_empty())
        .map(|errors| join_errors(&errors))
        .unwrap_or_else(|| String::from_utf8_lossy(response.body()).to_string());

    FalconApiError::Api {
        endpoint: path.to_string(),
        status: response.status().as_u16(),
        message,
    }
}
