//! # Helpers to build a reqwest blocking client and handle its responses
use super::client::{HttpClient, HttpClientError};
use super::config::HttpConfig;
use reqwest::{
    blocking::{Client, Response},
    Certificate, Proxy,
};
use std::{
    fmt::Display,
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

const CERT_EXTENSION: &str = "pem";

#[derive(thiserror::Error, Debug)]
pub enum ReqwestBuildError {
    #[error("could not build the reqwest client: {0}")]
    ClientBuilder(String),
    #[error("could not load certificates from {path}: {err}")]
    CertificateError { path: String, err: String },
}

/// An implementation of the `HttpClient` trait using the reqwest blocking client.
#[derive(Clone, Debug)]
pub struct HttpClientReqwest {
    client: Client,
}

impl HttpClientReqwest {
    /// Builds the client according to the provided configuration.
    pub fn try_new(config: HttpConfig) -> Result<Self, ReqwestBuildError> {
        Ok(Self {
            client: try_build_reqwest_client(config)?,
        })
    }
}

impl HttpClient for HttpClientReqwest {
    fn send(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> Result<http::Response<Vec<u8>>, HttpClientError> {
        let request = reqwest::blocking::Request::try_from(request)
            .map_err(|err| HttpClientError::BuildingError(err.to_string()))?;
        let response = self
            .client
            .execute(request)
            .map_err(|err| HttpClientError::TransportError(err.to_string()))?;
        try_build_response(response)
    }
}

/// Helper to build a [http::Response<Vec<u8>>] from a reqwest's blocking response.
/// It includes status, version, headers and body.
pub fn try_build_response(res: Response) -> Result<http::Response<Vec<u8>>, HttpClientError> {
    let status = res.status();
    let version = res.version();
    let headers = res.headers().clone();
    let body: Vec<u8> = res
        .bytes()
        .map_err(|err| HttpClientError::InvalidResponse(err.to_string()))?
        .into();
    let mut builder = http::Response::builder().status(status).version(version);
    if let Some(response_headers) = builder.headers_mut() {
        response_headers.extend(headers);
    }
    builder
        .body(body)
        .map_err(|err| HttpClientError::InvalidResponse(err.to_string()))
}

/// Builds a reqwest blocking client according to the provided configuration.
pub fn try_build_reqwest_client(config: HttpConfig) -> Result<Client, ReqwestBuildError> {
    let mut builder = Client::builder()
        .use_rustls_tls()
        .timeout(config.timeout)
        .connect_timeout(config.conn_timeout);

    // The proxy configuration already resolves the system environment variables.
    match config.proxy.url() {
        Some(proxy_url) => {
            debug!(%proxy_url, "Using proxy for Falcon API requests");
            let proxy = Proxy::all(proxy_url).map_err(|err| {
                ReqwestBuildError::ClientBuilder(format!("invalid proxy url: {err}"))
            })?;
            builder = builder.proxy(proxy);
        }
        None => builder = builder.no_proxy(),
    }

    for cert in certs_from_paths(config.proxy.ca_bundle_file(), config.proxy.ca_bundle_dir())? {
        builder = builder.add_root_certificate(cert)
    }

    builder
        .build()
        .map_err(|err| ReqwestBuildError::ClientBuilder(err.to_string()))
}

/// Tries to extract certificates from the provided `ca_bundle_file` and `ca_bundle_dir` paths.
fn certs_from_paths(
    ca_bundle_file: Option<&Path>,
    ca_bundle_dir: Option<&Path>,
) -> Result<Vec<Certificate>, ReqwestBuildError> {
    let mut certs = Vec::new();
    if let Some(file) = ca_bundle_file {
        certs.extend(certs_from_file(file)?);
    }
    if let Some(dir) = ca_bundle_dir {
        for path in cert_paths_from_dir(dir)? {
            certs.extend(certs_from_file(&path)?)
        }
    }
    Ok(certs)
}

/// Returns all certs bundled in the file corresponding to the provided path.
fn certs_from_file(path: &Path) -> Result<Vec<Certificate>, ReqwestBuildError> {
    let mut buf = Vec::new();
    File::open(path)
        .map_err(|err| certificate_error(path, err))?
        .read_to_end(&mut buf)
        .map_err(|err| certificate_error(path, err))?;
    Certificate::from_pem_bundle(&buf).map_err(|err| certificate_error(path, err))
}

/// Returns all paths to be considered to load certificates under the provided directory path.
fn cert_paths_from_dir(dir_path: &Path) -> Result<Vec<PathBuf>, ReqwestBuildError> {
    let dir_entries =
        std::fs::read_dir(dir_path).map_err(|err| certificate_error(dir_path, err))?;
    let paths = dir_entries.filter_map(|entry_res| match entry_res {
        Err(err) => {
            warn!(%err, directory=dir_path.to_string_lossy().to_string(), "Unreadable path when loading certificates from directory");
            None
        }
        Ok(entry) => {
            let path = entry.path();
            path_has_cert_extension(&path).then_some(path)
        }
    });
    Ok(paths.collect())
}

fn certificate_error<E: Display>(path: &Path, err: E) -> ReqwestBuildError {
    ReqwestBuildError::CertificateError {
        path: path.to_string_lossy().into(),
        err: err.to_string(),
    }
}

fn path_has_cert_extension(path: &Path) -> bool {
    match path.extension() {
        Some(extension) => extension == CERT_EXTENSION,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use std::io::Write;
    use tempfile::tempdir;

    const INVALID_TESTING_CERT: &str =
        "-----BEGIN CERTIFICATE-----\ninvalid!\n-----END CERTIFICATE-----";

    #[test]
    fn test_send_keeps_status_headers_and_body() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/resource")
                .header("content-type", "application/json")
                .body(r#"{"key":"value"}"#);
            then.status(201)
                .header("x-cs-region", "us-2")
                .body("created");
        });

        let client = HttpClientReqwest::try_new(HttpConfig::default()).unwrap();
        let request = http::Request::builder()
            .method("POST")
            .uri(server.url("/resource"))
            .header("content-type", "application/json")
            .body(br#"{"key":"value"}"#.to_vec())
            .unwrap();

        let response = client.send(request).unwrap();

        mock.assert();
        assert_eq!(response.status(), 201);
        assert_eq!(response.headers().get("x-cs-region").unwrap(), "us-2");
        assert_eq!(response.body(), b"created");
    }

    #[test]
    fn test_send_returns_unsuccessful_responses() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.any_request();
            then.status(403).body("access denied");
        });

        let client = HttpClientReqwest::try_new(HttpConfig::default()).unwrap();
        let request = http::Request::builder()
            .uri(server.url("/forbidden"))
            .body(Vec::new())
            .unwrap();

        let response = client.send(request).unwrap();
        assert_eq!(response.status(), 403);
        assert_eq!(response.body(), b"access denied");
    }

    #[test]
    fn test_send_transport_error() {
        let client = HttpClientReqwest::try_new(HttpConfig::default()).unwrap();
        // Nothing listens on the discard port.
        let request = http::Request::builder()
            .uri("http://127.0.0.1:9/unreachable")
            .body(Vec::new())
            .unwrap();

        let err = client.send(request).unwrap_err();
        assert_matches!(err, HttpClientError::TransportError(_));
    }

    #[test]
    fn test_certs_from_paths_no_certificates() {
        let certificates = certs_from_paths(None, None).unwrap();
        assert_eq!(certificates.len(), 0);
    }

    #[test]
    fn test_certs_from_paths_non_existing_certificate_path() {
        let err = certs_from_paths(Some(Path::new("non-existing.pem")), None).unwrap_err();
        assert_matches!(err, ReqwestBuildError::CertificateError { .. });

        let err = certs_from_paths(None, Some(Path::new("non-existing-dir"))).unwrap_err();
        assert_matches!(err, ReqwestBuildError::CertificateError { .. });
    }

    #[test]
    fn test_certs_from_paths_invalid_certificate_file() {
        let dir = tempdir().unwrap();
        let ca_bundle_file = dir.path().join("invalid_cert.pem");
        let mut file = File::create(&ca_bundle_file).unwrap();
        writeln!(file, "{INVALID_TESTING_CERT}").unwrap();

        let err = certs_from_paths(Some(&ca_bundle_file), None).unwrap_err();
        assert_matches!(err, ReqwestBuildError::CertificateError { .. });
    }

    #[test]
    fn test_cert_paths_from_dir_only_pem_files() {
        let dir = tempdir().unwrap();
        File::create(dir.path().join("a.pem")).unwrap();
        File::create(dir.path().join("b.txt")).unwrap();
        File::create(dir.path().join("c.pem.bk")).unwrap();

        let paths = cert_paths_from_dir(dir.path()).unwrap();
        assert_eq!(paths, vec![dir.path().join("a.pem")]);
    }

    #[test]
    fn test_build_client_invalid_proxy() {
        let config = HttpConfig {
            proxy: crate::http::proxy::ProxyConfig::from_url("http://[invalid".to_string()),
            ..Default::default()
        };
        let err = try_build_reqwest_client(config).unwrap_err();
        assert_matches!(err, ReqwestBuildError::ClientBuilder(_));
    }
}
