use crate::defaults::{DEFAULT_HTTP_CONN_TIMEOUT, DEFAULT_HTTP_TIMEOUT};
use crate::http::proxy::ProxyConfig;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    pub(crate) timeout: Duration,
    pub(crate) conn_timeout: Duration,
    pub(crate) proxy: ProxyConfig,
}

impl HttpConfig {
    pub fn new(timeout: Duration, conn_timeout: Duration, proxy: ProxyConfig) -> Self {
        Self {
            timeout,
            conn_timeout,
            proxy,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_HTTP_TIMEOUT,
            DEFAULT_HTTP_CONN_TIMEOUT,
            ProxyConfig::default(),
        )
    }
}
