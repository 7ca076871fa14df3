use crate::falcon::api::FalconApiError;
use crate::falcon::auth::AuthError;
use crate::http::client::HttpClientError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PushError {
    #[error("Falcon API error: {0}")]
    Api(#[from] FalconApiError),
    #[error("verification failed, Falcon API error: {0}")]
    Verification(FalconApiError),
    #[error("the API credentials belong to CID `{actual}`, not to `{expected}`")]
    ScopeMismatch { expected: String, actual: String },
    #[error("host group `{0}` not found")]
    HostGroupNotFound(String),
    #[error("no put file named `{0}` in the RTR library")]
    PutFileNotFound(String),
    #[error("no put file named `{name}` has sha256 `{expected}`")]
    PutFileHashMismatch { name: String, expected: String },
    #[error("RTR batch session could not be initiated: {0}")]
    BatchInitFailed(String),
}

impl PushError {
    /// API errors raised while verifying the push happen before any host is touched.
    pub(crate) fn into_verification(self) -> Self {
        match self {
            Self::Api(err) => Self::Verification(err),
            err => err,
        }
    }

    /// Errors raised before any host is touched: rejected credentials or permissions, an
    /// unreachable API or a failed verification.
    pub fn is_precondition(&self) -> bool {
        match self {
            Self::Api(FalconApiError::Auth(AuthError::HttpClient(_) | AuthError::Rejected(..))) => {
                true
            }
            Self::Api(FalconApiError::HttpClient(HttpClientError::TransportError(_))) => true,
            Self::Api(FalconApiError::Api { status, .. }) => matches!(status, 401 | 403),
            Self::Api(_) | Self::BatchInitFailed(_) => false,
            Self::Verification(_)
            | Self::ScopeMismatch { .. }
            | Self::HostGroupNotFound(_)
            | Self::PutFileNotFound(_)
            | Self::PutFileHashMismatch { .. } => true,
        }
    }
}
