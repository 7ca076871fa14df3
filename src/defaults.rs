use std::time::Duration;

pub const PUSHHOSTS_CONFIG_ENV_VAR_PREFIX: &str = "PUSHHOSTS";

// Falcon
pub const HOSTS_PLATFORM_FILTER: &str = "platform_name:'Windows'";
/// Maximum page size supported by the host query APIs.
pub const MAX_HOSTS_PAGE_SIZE: u32 = 5000;
pub const MAX_HOSTS_PER_BATCH: usize = 10_000;
pub const DEFAULT_PUT_FILE_NAME: &str = "hosts";
pub const DEFAULT_RTR_SESSION_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RTR_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);
/// Extra time an RTR request is given on top of the timeout the API waits for the hosts.
pub const RTR_REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(10);

// RTR commands
pub const HOSTS_FILE_DIRECTORY: &str = r"c:\windows\system32\drivers\etc";
pub const HOSTS_BACKUP_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

// HTTP
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_HTTP_CONN_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_HTTP_RETRIES: usize = 3;
pub const DEFAULT_HTTP_RETRY_INTERVAL: Duration = Duration::from_secs(2);

// Logging
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
pub const LOG_LEVEL_ENV_VAR: &str = "LOG_LEVEL";
