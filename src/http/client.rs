use http::{Request, Response};
use thiserror::Error;

/// An enumeration of potential errors related to the HTTP client.
#[derive(Error, Debug)]
pub enum HttpClientError {
    /// Represents an error building the HTTP request.
    #[error("could not build the HTTP request: `{0}`")]
    BuildingError(String),
    /// Represents HTTP Transport error.
    #[error("transport HTTP client error: `{0}`")]
    TransportError(String),
    /// Represents an error reading or converting the HTTP response.
    #[error("invalid HTTP response: `{0}`")]
    InvalidResponse(String),
}

/// The `HttpClient` trait defines the HTTP send interface to be implemented
/// by HTTP clients.
///
/// Unsuccessful status codes are not errors at this level: the response is returned as is
/// so the caller can read the error payload.
pub trait HttpClient {
    /// Returns a `http::Response<Vec<u8>>` structure as the HTTP response or
    /// HttpClientError if the request could not be performed.
    fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpClientError>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use mockall::mock;

    mock! {
        pub HttpClientMock {}
        impl HttpClient for HttpClientMock {
            fn send(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>, HttpClientError>;
        }
    }

    impl MockHttpClientMock {
        pub fn should_send(&mut self, response: Response<Vec<u8>>) {
            self.expect_send().once().return_once(move |_| Ok(response));
        }
        pub fn should_not_send(&mut self, error: HttpClientError) {
            self.expect_send().once().return_once(move |_| Err(error));
        }
    }
}
