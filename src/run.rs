//! Wires the configuration into the Falcon client and runs the push.
use crate::cli::error::CliError;
use crate::config::PushHostsConfig;
use crate::falcon::api::FalconApi;
use crate::falcon::auth::OAuth2Authenticator;
use crate::falcon::client::FalconClient;
use crate::http::reqwest::HttpClientReqwest;
use crate::push::pusher::{HostsPusher, PushSettings};
use crate::push::report::PushReport;
use tracing::{info, warn};

/// Pushes the HOSTS file with the provided configuration. The API token is revoked once the
/// push ends, whatever its result.
pub fn run(config: &PushHostsConfig, dry_run: bool) -> Result<PushReport, CliError> {
    let http_client =
        HttpClientReqwest::try_new(config.http.client_config(config.rtr.request_timeout()))
            .map_err(|err| CliError::InvalidConfig(err.to_string()))?;
    let authenticator =
        OAuth2Authenticator::new(http_client.clone(), config.falcon.credentials());

    let client = FalconClient::try_connect(
        http_client,
        authenticator,
        &config.falcon.base_url,
        config.http.retry_policy(),
    )?;
    info!(
        "Authenticated to {} with client id {}",
        client.base_url(),
        config.falcon.client_id
    );

    let pusher = HostsPusher::new(client, PushSettings::new(config, dry_run));
    let result = pusher.run();

    if let Err(err) = pusher.api().revoke() {
        warn!("Unable to revoke the API token: {err}");
    }

    Ok(result?)
}
