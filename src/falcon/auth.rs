use crate::falcon::response::TokenResponse;
use crate::http::client::{HttpClient, HttpClientError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::Request;
use std::fmt::{Debug, Formatter};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};
use url::form_urlencoded;

pub const TOKEN_PATH: &str = "/oauth2/token";
pub const REVOKE_PATH: &str = "/oauth2/revoke";
/// Header reporting the cloud region the tenant lives in.
pub const REGION_HEADER: &str = "x-cs-region";
/// A token is refreshed this long before its actual expiration.
const EXPIRATION_MARGIN_SECONDS: i64 = 60;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("http client error: `{0}`")]
    HttpClient(#[from] HttpClientError),
    #[error("authentication rejected with status `{0}`: `{1}`")]
    Rejected(u16, String),
    #[error("unable to deserialize token: `{0}`")]
    Deserialize(String),
    #[error("poisoned token cache")]
    Poison,
}

/// API client credentials. The secret is never printed.
#[derive(Clone, PartialEq)]
pub struct Credentials {
    client_id: String,
    client_secret: String,
    member_cid: Option<String>,
}

impl Credentials {
    pub fn new(client_id: String, client_secret: String, member_cid: Option<String>) -> Self {
        Self {
            client_id,
            client_secret,
            member_cid,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    fn basic_auth(&self) -> String {
        let encoded = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
        format!("Basic {encoded}")
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("member_cid", &self.member_cid)
            .finish()
    }
}

/// Bearer token returned by the OAuth2 service, used to make authorized requests:
///
/// Authorization: Bearer <ACCESS TOKEN HERE>
#[derive(Clone)]
pub struct Token {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl Token {
    pub fn new(access_token: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token,
            expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at - TimeDelta::seconds(EXPIRATION_MARGIN_SECONDS) <= Utc::now()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl Debug for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Result of a successful authentication.
#[derive(Debug)]
pub struct Authentication {
    pub token: Token,
    /// Region reported by the token endpoint, if any.
    pub region: Option<String>,
}

/// Authenticator exchanges the client credentials for a token:
/// POST /oauth2/token
///
/// Response:
/// {
///    "access_token": "<TOKEN>",
///    "expires_in": 1799,
///    "token_type": "bearer"
/// }
#[cfg_attr(test, mockall::automock)]
pub trait Authenticator {
    fn authenticate(&self, base_url: &str) -> Result<Authentication, AuthError>;
    fn revoke(&self, base_url: &str, token: &Token) -> Result<(), AuthError>;
}

/// OAuth2 client credentials authenticator.
pub struct OAuth2Authenticator<C>
where
    C: HttpClient,
{
    http_client: C,
    credentials: Credentials,
}

impl<C> OAuth2Authenticator<C>
where
    C: HttpClient,
{
    pub fn new(http_client: C, credentials: Credentials) -> Self {
        Self {
            http_client,
            credentials,
        }
    }

    fn form_request(
        url: String,
        authorization: Option<String>,
        form: Vec<u8>,
    ) -> Result<Request<Vec<u8>>, AuthError> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .header(ACCEPT, "application/json");
        if let Some(authorization) = authorization {
            builder = builder.header(AUTHORIZATION, authorization);
        }
        builder
            .body(form)
            .map_err(|err| HttpClientError::BuildingError(err.to_string()).into())
    }
}

impl<C> Authenticator for OAuth2Authenticator<C>
where
    C: HttpClient,
{
    fn authenticate(&self, base_url: &str) -> Result<Authentication, AuthError> {
        let mut form = form_urlencoded::Serializer::new(String::new());
        form.append_pair("client_id", &self.credentials.client_id)
            .append_pair("client_secret", &self.credentials.client_secret);
        if let Some(member_cid) = &self.credentials.member_cid {
            form.append_pair("member_cid", member_cid);
        }
        let request = Self::form_request(
            format!("{base_url}{TOKEN_PATH}"),
            None,
            form.finish().into_bytes(),
        )?;

        let response = self.http_client.send(request)?;
        if !response.status().is_success() {
            return Err(AuthError::Rejected(
                response.status().as_u16(),
                String::from_utf8_lossy(response.body()).to_string(),
            ));
        }

        let region = response
            .headers()
            .get(REGION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let token_response: TokenResponse = serde_json::from_slice(response.body())
            .map_err(|err| AuthError::Deserialize(err.to_string()))?;
        debug!(
            token_type = %token_response.token_type,
            expires_in = token_response.expires_in,
            "Token obtained"
        );

        let expires_at = TimeDelta::try_seconds(token_response.expires_in)
            .and_then(|expires_in| Utc::now().checked_add_signed(expires_in))
            .ok_or_else(|| {
                AuthError::Deserialize(format!(
                    "`expires_in` out of range: {}",
                    token_response.expires_in
                ))
            })?;

        Ok(Authentication {
            token: Token::new(token_response.access_token, expires_at),
            region,
        })
    }

    fn revoke(&self, base_url: &str, token: &Token) -> Result<(), AuthError> {
        let form = form_urlencoded::Serializer::new(String::new())
            .append_pair("token", &token.access_token)
            .finish();
        let request = Self::form_request(
            format!("{base_url}{REVOKE_PATH}"),
            Some(self.credentials.basic_auth()),
            form.into_bytes(),
        )?;

        let response = self.http_client.send(request)?;
        if !response.status().is_success() {
            return Err(AuthError::Rejected(
                response.status().as_u16(),
                String::from_utf8_lossy(response.body()).to_string(),
            ));
        }
        Ok(())
    }
}

/// Keeps the current token and refreshes it when it is missing or about to expire.
#[derive(Default)]
pub struct TokenCache {
    token: Mutex<Option<Token>>,
}

impl TokenCache {
    pub fn new(token: Token) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }

    /// Returns the cached token, calling `refresh` to get a new one if required.
    pub fn get_or_refresh<F>(&self, refresh: F) -> Result<Token, AuthError>
    where
        F: FnOnce() -> Result<Token, AuthError>,
    {
        let mut cached_token = self.token.lock().map_err(|_| AuthError::Poison)?;
        match cached_token.as_ref() {
            Some(token) if !token.is_expired() => Ok(token.clone()),
            _ => {
                info!("Refreshing Falcon API token");
                let token = refresh()?;
                *cached_token = Some(token.clone());
                Ok(token)
            }
        }
    }

    /// Drops the cached token so the next call refreshes it.
    pub fn invalidate(&self) -> Result<(), AuthError> {
        *self.token.lock().map_err(|_| AuthError::Poison)? = None;
        Ok(())
    }

    /// Takes the cached token out, leaving the cache empty.
    pub fn take(&self) -> Result<Option<Token>, AuthError> {
        Ok(self.token.lock().map_err(|_| AuthError::Poison)?.take())
    }
}
