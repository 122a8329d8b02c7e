//! Global constants used throughout the dst-updater codebase.
//!
//! This module holds the SteamCMD argument vocabulary, the log markers the
//! installer depends on, retry parameters and timeouts. The marker strings are
//! matched verbatim against SteamCMD output, so changing any of them changes
//! how runs are classified.

use std::time::Duration;

/// Steam application id of the Don't Starve Together dedicated server.
pub const APP_ID: &str = "343050";

/// Default root under which the server and SteamCMD are installed.
pub const DEFAULT_ROOT_DIR: &str = "/home/container/games";

/// Default SteamCMD bootstrap archive.
pub const DEFAULT_STEAMCMD_URL: &str =
    "https://steamcdn-a.akamaihd.net/client/installer/steamcmd_linux.tar.gz";

/// Name of the SteamCMD launcher script inside the tool directory.
pub const STEAMCMD_EXECUTABLE: &str = "steamcmd.sh";

/// Name the bootstrap archive is downloaded to before unpacking.
pub const STEAMCMD_ARCHIVE: &str = "steamcmd.tar.gz";

/// Server binary that must exist after a successful install, relative to the
/// install directory.
pub const VALIDATION_BINARY: &str = "bin/dontstarve_dedicated_server_nullrenderer";

/// Number of update attempts before giving up.
pub const MAX_RETRIES: u32 = 5;

/// Delay between failed update attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(10);

/// Minimum free space (in MiB) required before an update is attempted.
pub const MIN_DISK_SPACE_MB: u64 = 2048;

/// Timeout for the `app_info_print` remote version query (60 seconds).
///
/// SteamCMD occasionally stalls on login; an unanswered query degrades to an
/// unknown remote version rather than blocking the run.
pub const REMOTE_QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Default time to wait for another process to release the install lock.
pub fn default_lock_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Maximum backoff delay for lock acquisition (500ms).
pub const MAX_BACKOFF_DELAY_MS: u64 = 500;

/// Starting delay for lock acquisition backoff (10ms).
pub const STARTING_BACKOFF_DELAY_MS: u64 = 10;

/// Lock file created inside the install directory while an update runs.
pub const INSTALL_LOCK_FILE: &str = ".dst-updater.lock";

/// Sentinel build id reported when nothing is installed.
pub const NOT_INSTALLED_BUILD: &str = "0";

/// Marker SteamCMD prints once the app is fully installed.
pub fn success_marker(app_id: &str) -> String {
    format!("Success! App '{app_id}' fully installed")
}

/// SteamCMD error code printed on rate limiting and dropped connections.
pub const NETWORK_ERROR_MARKER: &str = "0x202";

/// SteamCMD error code printed when content cannot be written to disk.
pub const DISK_ERROR_MARKER: &str = "0x6";

/// Proxy variables attached to child processes when a proxy is configured.
pub const PROXY_ENV_VARS: [&str; 3] = ["http_proxy", "https_proxy", "all_proxy"];
