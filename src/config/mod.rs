//! Run configuration.
//!
//! Values are layered, lowest priority first: the optional YAML file, `PUSHHOSTS_` prefixed
//! environment variables (e.g. `PUSHHOSTS_LOG__LEVEL=debug`) and the command line overrides.
use crate::defaults::{
    DEFAULT_HTTP_CONN_TIMEOUT, DEFAULT_HTTP_RETRIES, DEFAULT_HTTP_RETRY_INTERVAL,
    DEFAULT_HTTP_TIMEOUT, DEFAULT_PUT_FILE_NAME, DEFAULT_RTR_COMMAND_TIMEOUT,
    DEFAULT_RTR_SESSION_TIMEOUT, HOSTS_PLATFORM_FILTER, MAX_HOSTS_PAGE_SIZE, MAX_HOSTS_PER_BATCH,
    PUSHHOSTS_CONFIG_ENV_VAR_PREFIX, RTR_REQUEST_TIMEOUT_MARGIN,
};
use crate::falcon::api::Scope;
use crate::falcon::auth::Credentials;
use crate::falcon::client::RetryPolicy;
use crate::falcon::cloud::FalconCloud;
use crate::http::config::HttpConfig;
use crate::http::proxy::ProxyConfig;
use crate::logging::config::LoggingConfig;
use config::{Config, Environment, File, FileFormat};
use duration_str::deserialize_duration;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const SHA256_RE: &str = "^[a-fA-F0-9]{64}$";

fn sha256_regex() -> &'static Regex {
    static SHA256_RE_ONCE: OnceLock<Regex> = OnceLock::new();
    SHA256_RE_ONCE.get_or_init(|| Regex::new(SHA256_RE).unwrap())
}

#[derive(Error, Debug)]
pub enum PushHostsConfigError {
    #[error("loading configuration: `{0}`")]
    Load(#[from] config::ConfigError),
    #[error("`{0}` is required")]
    Missing(&'static str),
    #[error("invalid `{0}`: {1}")]
    Invalid(&'static str, String),
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PushHostsConfig {
    #[serde(default)]
    pub falcon: FalconConfig,
    pub scope: Scope,
    #[serde(default)]
    pub scope_id: String,
    #[serde(default)]
    pub put_file: PutFileConfig,
    #[serde(default)]
    pub rtr: RtrConfig,
    #[serde(default)]
    pub hosts: HostsConfig,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default)]
    pub log: LoggingConfig,
}

impl PushHostsConfig {
    pub fn validate(&self) -> Result<(), PushHostsConfigError> {
        if self.falcon.client_id.trim().is_empty() {
            return Err(PushHostsConfigError::Missing("falcon.client_id"));
        }
        if self.falcon.client_secret.trim().is_empty() {
            return Err(PushHostsConfigError::Missing("falcon.client_secret"));
        }
        if self.scope_id.trim().is_empty() {
            return Err(PushHostsConfigError::Missing("scope_id"));
        }
        if self.put_file.name.trim().is_empty() {
            return Err(PushHostsConfigError::Missing("put_file.name"));
        }
        if let Some(sha256) = &self.put_file.sha256 {
            if !sha256_regex().is_match(sha256) {
                return Err(PushHostsConfigError::Invalid(
                    "put_file.sha256",
                    format!("`{sha256}` is not 64 hexadecimal characters"),
                ));
            }
        }
        if self.hosts.page_size == 0 {
            return Err(PushHostsConfigError::Invalid(
                "hosts.page_size",
                "must be greater than 0".to_string(),
            ));
        }
        if self.rtr.max_hosts_per_batch == 0 {
            return Err(PushHostsConfigError::Invalid(
                "rtr.max_hosts_per_batch",
                "must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Falcon API access.
#[derive(Deserialize, Clone, PartialEq, Default)]
pub struct FalconConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Child CID for Flight Control (MSSP) tenants.
    #[serde(default)]
    pub member_cid: Option<String>,
    #[serde(default)]
    pub base_url: FalconCloud,
}

impl FalconConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            self.client_id.clone(),
            self.client_secret.clone(),
            self.member_cid.clone().filter(|cid| !cid.is_empty()),
        )
    }
}

impl Debug for FalconConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FalconConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("member_cid", &self.member_cid)
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PutFileConfig {
    #[serde(default = "default_put_file_name")]
    pub name: String,
    /// Expected SHA256 of the put file content.
    #[serde(default)]
    pub sha256: Option<String>,
}

impl Default for PutFileConfig {
    fn default() -> Self {
        Self {
            name: default_put_file_name(),
            sha256: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RtrConfig {
    #[serde(default = "default_true")]
    pub queue_offline: bool,
    #[serde(
        default = "default_session_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub session_timeout: Duration,
    #[serde(
        default = "default_command_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub command_timeout: Duration,
    #[serde(default = "default_max_hosts_per_batch")]
    pub max_hosts_per_batch: usize,
}

impl RtrConfig {
    /// Time an RTR request may take: the API holds it open while it waits for the hosts.
    pub fn request_timeout(&self) -> Duration {
        self.session_timeout.max(self.command_timeout) + RTR_REQUEST_TIMEOUT_MARGIN
    }
}

impl Default for RtrConfig {
    fn default() -> Self {
        Self {
            queue_offline: true,
            session_timeout: DEFAULT_RTR_SESSION_TIMEOUT,
            command_timeout: DEFAULT_RTR_COMMAND_TIMEOUT,
            max_hosts_per_batch: MAX_HOSTS_PER_BATCH,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct HostsConfig {
    #[serde(default = "default_platform_filter")]
    pub platform_filter: String,
    #[serde(default = "default_page_size")]
    page_size: u32,
}

impl HostsConfig {
    /// Page size capped to the maximum the host query APIs accept.
    pub fn page_size(&self) -> u32 {
        self.page_size.min(MAX_HOSTS_PAGE_SIZE)
    }
}

impl Default for HostsConfig {
    fn default() -> Self {
        Self {
            platform_filter: default_platform_filter(),
            page_size: MAX_HOSTS_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct HttpSettings {
    #[serde(
        default = "default_http_timeout",
        deserialize_with = "deserialize_duration"
    )]
    timeout: Duration,
    #[serde(
        default = "default_http_conn_timeout",
        deserialize_with = "deserialize_duration"
    )]
    conn_timeout: Duration,
    #[serde(default = "default_http_retries")]
    retries: usize,
    #[serde(
        default = "default_http_retry_interval",
        deserialize_with = "deserialize_duration"
    )]
    retry_interval: Duration,
    #[serde(default)]
    proxy: ProxyConfig,
}

impl HttpSettings {
    /// The request timeout is raised to `min_timeout` when it is shorter.
    pub fn client_config(&self, min_timeout: Duration) -> HttpConfig {
        HttpConfig::new(
            self.timeout.max(min_timeout),
            self.conn_timeout,
            self.proxy.clone(),
        )
    }

    /// `retries` counts the attempts after the first one.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retries + 1,
            interval: self.retry_interval,
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_HTTP_TIMEOUT,
            conn_timeout: DEFAULT_HTTP_CONN_TIMEOUT,
            retries: DEFAULT_HTTP_RETRIES,
            retry_interval: DEFAULT_HTTP_RETRY_INTERVAL,
            proxy: ProxyConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_put_file_name() -> String {
    DEFAULT_PUT_FILE_NAME.to_string()
}
fn default_session_timeout() -> Duration {
    DEFAULT_RTR_SESSION_TIMEOUT
}
fn default_command_timeout() -> Duration {
    DEFAULT_RTR_COMMAND_TIMEOUT
}
fn default_max_hosts_per_batch() -> usize {
    MAX_HOSTS_PER_BATCH
}
fn default_platform_filter() -> String {
    HOSTS_PLATFORM_FILTER.to_string()
}
fn default_page_size() -> u32 {
    MAX_HOSTS_PAGE_SIZE
}
fn default_http_timeout() -> Duration {
    DEFAULT_HTTP_TIMEOUT
}
fn default_http_conn_timeout() -> Duration {
    DEFAULT_HTTP_CONN_TIMEOUT
}
fn default_http_retries() -> usize {
    DEFAULT_HTTP_RETRIES
}
fn default_http_retry_interval() -> Duration {
    DEFAULT_HTTP_RETRY_INTERVAL
}

/// Builds the [PushHostsConfig] from every configuration source.
#[derive(Debug, Default)]
pub struct PushHostsConfigLoader {
    file: Option<PathBuf>,
    environment: Option<HashMap<String, String>>,
    overrides: Vec<(&'static str, String)>,
}

impl PushHostsConfigLoader {
    pub fn new(file: Option<PathBuf>) -> Self {
        Self {
            file,
            ..Default::default()
        }
    }

    /// Replaces the process environment as source of `PUSHHOSTS_` variables.
    pub fn with_environment(self, environment: HashMap<String, String>) -> Self {
        Self {
            environment: Some(environment),
            ..self
        }
    }

    /// Sets `key` to `value` over every other source. `None` values are ignored.
    pub fn with_override(mut self, key: &'static str, value: Option<String>) -> Self {
        if let Some(value) = value {
            self.overrides.push((key, value));
        }
        self
    }

    pub fn load(self) -> Result<PushHostsConfig, PushHostsConfigError> {
        let mut builder = Config::builder();
        if let Some(file) = &self.file {
            builder = builder.add_source(File::from(file.as_path()).format(FileFormat::Yaml));
        }

        // Eg. `PUSHHOSTS_RTR__QUEUE_OFFLINE=false` sets `rtr.queue_offline`. Double underscore
        // separates levels because keys are snake_case.
        builder = builder.add_source(
            Environment::with_prefix(PUSHHOSTS_CONFIG_ENV_VAR_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .source(self.environment),
        );

        for (key, value) in self.overrides {
            builder = builder.set_override(key, value)?;
        }

        let config = builder.build()?.try_deserialize::<PushHostsConfig>()?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::falcon::cloud::EU1_BASE_URL;
    use assert_matches::assert_matches;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const VALID_SHA256: &str = "d2a84f4b8b650937ec8f73cd8be2c74add5a911ba64df27458ed8229da804a26";

    fn config_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn loader(file: &NamedTempFile) -> PushHostsConfigLoader {
        PushHostsConfigLoader::new(Some(file.path().to_path_buf())).with_environment(HashMap::new())
    }

    #[test]
    fn test_load_full_config() {
        let file = config_file(&format!(
            r#"
falcon:
  client_id: id
  client_secret: secret
  member_cid: child
  base_url: eu-1
scope: hostgroup
scope_id: group-1
put_file:
  name: hosts
  sha256: {VALID_SHA256}
rtr:
  queue_offline: false
  session_timeout: 1m
  command_timeout: 45s
  max_hosts_per_batch: 500
hosts:
  platform_filter: "platform_name:'Windows'+product_type_desc:'Server'"
  page_size: 100
http:
  timeout: 10s
  conn_timeout: 5s
  retries: 1
  retry_interval: 100ms
  proxy:
    url: http://proxy:3128
log:
  level: debug
"#
        ));

        let config = loader(&file).load().unwrap();

        assert_eq!(config.falcon.base_url.base_url(), EU1_BASE_URL);
        assert_eq!(config.scope, Scope::HostGroup);
        assert_eq!(config.scope_id, "group-1");
        assert_eq!(config.put_file.sha256.as_deref(), Some(VALID_SHA256));
        assert!(!config.rtr.queue_offline);
        assert_eq!(config.rtr.session_timeout, Duration::from_secs(60));
        assert_eq!(config.rtr.command_timeout, Duration::from_secs(45));
        assert_eq!(config.rtr.max_hosts_per_batch, 500);
        assert_eq!(config.hosts.page_size(), 100);
        assert_eq!(
            config.http.retry_policy(),
            RetryPolicy {
                max_attempts: 2,
                interval: Duration::from_millis(100)
            }
        );
        assert_eq!(
            config.http.client_config(config.rtr.request_timeout()),
            HttpConfig::new(
                Duration::from_secs(70),
                Duration::from_secs(5),
                ProxyConfig::from_url("http://proxy:3128".to_string())
            )
        );
        assert_eq!(config.log.level.to_string(), "debug");
    }

    #[test]
    fn test_defaults() {
        let file = config_file(
            r#"
falcon:
  client_id: id
  client_secret: secret
scope: cid
scope_id: ABC-12
"#,
        );

        let config = loader(&file).load().unwrap();

        assert!(config.falcon.base_url.is_auto());
        assert_eq!(config.put_file, PutFileConfig::default());
        assert_eq!(config.rtr, RtrConfig::default());
        assert_eq!(config.hosts, HostsConfig::default());
        assert_eq!(config.http, HttpSettings::default());
        assert_eq!(config.log, LoggingConfig::default());
        assert_eq!(config.http.retry_policy().max_attempts, 4);
    }

    #[test]
    fn test_request_timeout_outlasts_rtr_timeouts() {
        let rtr = RtrConfig::default();
        let http = HttpSettings::default();
        let client_config = http.client_config(rtr.request_timeout());
        assert_eq!(client_config.timeout, Duration::from_secs(40));
        assert!(client_config.timeout > rtr.command_timeout);

        let http: HttpSettings = serde_yaml::from_str("timeout: 5m").unwrap();
        assert_eq!(
            http.client_config(rtr.request_timeout()).timeout,
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_page_size_is_capped() {
        let hosts: HostsConfig = serde_yaml::from_str("page_size: 10000").unwrap();
        assert_eq!(hosts.page_size(), MAX_HOSTS_PAGE_SIZE);
    }

    #[test]
    fn test_environment_and_overrides_priority() {
        let file = config_file(
            r#"
falcon:
  client_id: file-id
  client_secret: file-secret
scope: cid
scope_id: file-cid
rtr:
  queue_offline: true
"#,
        );

        let config = loader(&file)
            .with_environment(HashMap::from([
                ("PUSHHOSTS_FALCON__CLIENT_ID".to_string(), "env-id".to_string()),
                ("PUSHHOSTS_SCOPE_ID".to_string(), "env-cid".to_string()),
                ("PUSHHOSTS_RTR__QUEUE_OFFLINE".to_string(), "false".to_string()),
            ]))
            .with_override("scope_id", Some("flag-cid".to_string()))
            .with_override("falcon.client_secret", None)
            .load()
            .unwrap();

        assert_eq!(config.falcon.client_id, "env-id");
        assert_eq!(config.falcon.client_secret, "file-secret");
        assert_eq!(config.scope_id, "flag-cid");
        assert!(!config.rtr.queue_offline);
    }

    #[test]
    fn test_overrides_without_file() {
        let config = PushHostsConfigLoader::new(None)
            .with_environment(HashMap::new())
            .with_override("falcon.client_id", Some("id".to_string()))
            .with_override("falcon.client_secret", Some("secret".to_string()))
            .with_override("scope", Some("CID".to_string()))
            .with_override("scope_id", Some("ABC".to_string()))
            .with_override("falcon.base_url", Some("us-2".to_string()))
            .load()
            .unwrap();

        assert_eq!(config.scope, Scope::Cid);
        assert_eq!(config.falcon.base_url, FalconCloud::Us2);
    }

    #[test]
    fn test_invalid_configs() {
        struct TestCase {
            name: &'static str,
            overrides: Vec<(&'static str, &'static str)>,
        }

        impl TestCase {
            fn run(self) {
                let mut loader = PushHostsConfigLoader::new(None)
                    .with_environment(HashMap::new())
                    .with_override("falcon.client_id", Some("id".to_string()))
                    .with_override("falcon.client_secret", Some("secret".to_string()))
                    .with_override("scope", Some("cid".to_string()))
                    .with_override("scope_id", Some("ABC".to_string()));
                for (key, value) in self.overrides {
                    loader = loader.with_override(key, Some(value.to_string()));
                }
                assert!(loader.load().is_err(), "Test Name: {}", self.name);
            }
        }

        let test_cases = vec![
            TestCase {
                name: "unknown scope",
                overrides: vec![("scope", "tenant")],
            },
            TestCase {
                name: "empty scope id",
                overrides: vec![("scope_id", " ")],
            },
            TestCase {
                name: "empty client id",
                overrides: vec![("falcon.client_id", "")],
            },
            TestCase {
                name: "empty client secret",
                overrides: vec![("falcon.client_secret", "")],
            },
            TestCase {
                name: "unknown cloud",
                overrides: vec![("falcon.base_url", "mars-1")],
            },
            TestCase {
                name: "short sha256",
                overrides: vec![("put_file.sha256", "abc123")],
            },
            TestCase {
                name: "non hex sha256",
                overrides: vec![(
                    "put_file.sha256",
                    "z2a84f4b8b650937ec8f73cd8be2c74add5a911ba64df27458ed8229da804a26",
                )],
            },
            TestCase {
                name: "invalid log level",
                overrides: vec![("log.level", "verbose")],
            },
        ];

        for test_case in test_cases {
            test_case.run();
        }
    }

    #[test]
    fn test_missing_credentials_error() {
        let err = PushHostsConfigLoader::new(None)
            .with_environment(HashMap::new())
            .with_override("scope", Some("cid".to_string()))
            .with_override("scope_id", Some("ABC".to_string()))
            .load()
            .unwrap_err();
        assert_matches!(err, PushHostsConfigError::Missing("falcon.client_id"));
    }

    #[test]
    fn test_missing_file() {
        let err = PushHostsConfigLoader::new(Some(PathBuf::from("/nonexistent/pushhosts.yaml")))
            .with_environment(HashMap::new())
            .load()
            .unwrap_err();
        assert_matches!(err, PushHostsConfigError::Load(_));
    }

    #[test]
    fn test_secret_not_in_debug() {
        let config = FalconConfig {
            client_id: "id".to_string(),
            client_secret: "s3cr3t".to_string(),
            ..Default::default()
        };
        assert!(!format!("{config:?}").contains("s3cr3t"));
    }
}
