//! Configuration for update runs.
//!
//! Settings are layered, later layers winning:
//!
//! 1. Built-in defaults (see [`crate::constants`])
//! 2. An optional TOML file: the `--config` path, else
//!    `~/.dst-updater/config.toml` when it exists
//! 3. Environment variables and command-line flags (merged by clap, flags
//!    winning over `DST_UPDATER_*` variables)
//!
//! The result is an immutable [`UpdaterConfig`].
//!
//! # File Format
//!
//! ```toml
//! install_dir = "/srv/dst"
//! steamcmd_dir = "/srv/steamcmd"
//! proxy = "http://10.0.0.1:3128"
//! max_retries = 3
//! retry_delay_secs = 30
//! min_disk_space_mb = 4096
//! ```
//!
//! Paths accept `~` and `$VAR` and are made absolute.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::constants::{
    APP_ID, DEFAULT_ROOT_DIR, DEFAULT_STEAMCMD_URL, MAX_RETRIES, MIN_DISK_SPACE_MB,
    REMOTE_QUERY_TIMEOUT, RETRY_DELAY, default_lock_timeout,
};

/// Contents of the optional configuration file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Server install directory
    pub install_dir: Option<String>,
    /// SteamCMD directory
    pub steamcmd_dir: Option<String>,
    /// Proxy URL for SteamCMD and the bootstrap download
    pub proxy: Option<String>,
    /// SteamCMD bootstrap archive URL
    pub steamcmd_url: Option<String>,
    /// Update attempts before giving up
    pub max_retries: Option<u32>,
    /// Seconds between failed attempts
    pub retry_delay_secs: Option<u64>,
    /// Free space required before updating, in MiB
    pub min_disk_space_mb: Option<u64>,
    /// Seconds to wait for another updater to release the install directory
    pub lock_timeout_secs: Option<u64>,
}

impl ConfigFile {
    /// `~/.dst-updater/config.toml`.
    ///
    /// # Errors
    ///
    /// Fails when the home directory cannot be determined.
    pub fn default_path() -> Result<PathBuf> {
        Ok(dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
            .join(".dst-updater")
            .join("config.toml"))
    }

    /// Load the file at `path`.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load an explicitly requested file, or the default file when present.
    ///
    /// An explicit path must exist; a missing default file yields an empty
    /// configuration.
    pub async fn load_with_optional(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from(path).await;
        }

        match Self::default_path() {
            Ok(path) if fs::try_exists(&path).await.unwrap_or(false) => {
                Self::load_from(&path).await
            }
            _ => Ok(Self::default()),
        }
    }
}

/// Values supplied on the command line or through `DST_UPDATER_*` variables.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// `--install-dir`
    pub install_dir: Option<String>,
    /// `--steamcmd-dir`
    pub steamcmd_dir: Option<String>,
    /// `--proxy`
    pub proxy: Option<String>,
    /// `--steamcmd-url`
    pub steamcmd_url: Option<String>,
    /// `--max-retries`
    pub max_retries: Option<u32>,
    /// `--retry-delay-secs`
    pub retry_delay_secs: Option<u64>,
    /// `--force`
    pub force: bool,
    /// `--check-only`
    pub check_only: bool,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdaterConfig {
    /// Steam app id to install
    pub app_id: String,
    /// Absolute server install directory
    pub install_dir: PathBuf,
    /// Absolute SteamCMD directory
    pub steamcmd_dir: PathBuf,
    /// Proxy URL, if any
    pub proxy: Option<String>,
    /// SteamCMD bootstrap archive URL
    pub steamcmd_url: String,
    /// Update even when the installed build is current
    pub force: bool,
    /// Report whether an update is available without installing it
    pub check_only: bool,
    /// Update attempts before giving up
    pub max_retries: u32,
    /// Delay between failed attempts
    pub retry_delay: Duration,
    /// Free space required before updating, in MiB
    pub min_disk_space_mb: u64,
    /// Time to wait for the install directory lock
    pub lock_timeout: Duration,
    /// Timeout for the remote version query
    pub query_timeout: Duration,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        let root = Path::new(DEFAULT_ROOT_DIR);
        Self {
            app_id: APP_ID.to_string(),
            install_dir: root.join("dst"),
            steamcmd_dir: root.join("steamcmd"),
            proxy: None,
            steamcmd_url: DEFAULT_STEAMCMD_URL.to_string(),
            force: false,
            check_only: false,
            max_retries: MAX_RETRIES,
            retry_delay: RETRY_DELAY,
            min_disk_space_mb: MIN_DISK_SPACE_MB,
            lock_timeout: default_lock_timeout(),
            query_timeout: REMOTE_QUERY_TIMEOUT,
        }
    }
}

impl UpdaterConfig {
    /// Merge defaults, the config file and overrides.
    ///
    /// # Errors
    ///
    /// Fails when a path cannot be expanded or made absolute.
    pub fn resolve(file: ConfigFile, overrides: ConfigOverrides) -> Result<Self> {
        let defaults = Self::default();

        let install_dir = match overrides.install_dir.or(file.install_dir) {
            Some(path) => resolve_path(&path)?,
            None => defaults.install_dir,
        };
        let steamcmd_dir = match overrides.steamcmd_dir.or(file.steamcmd_dir) {
            Some(path) => resolve_path(&path)?,
            None => defaults.steamcmd_dir,
        };

        Ok(Self {
            install_dir,
            steamcmd_dir,
            proxy: overrides.proxy.or(file.proxy).filter(|p| !p.trim().is_empty()),
            steamcmd_url: overrides.steamcmd_url.or(file.steamcmd_url).unwrap_or(defaults.steamcmd_url),
            force: overrides.force,
            check_only: overrides.check_only,
            max_retries: overrides
                .max_retries
                .or(file.max_retries)
                .unwrap_or(defaults.max_retries)
                .max(1),
            retry_delay: overrides
                .retry_delay_secs
                .or(file.retry_delay_secs)
                .map_or(defaults.retry_delay, Duration::from_secs),
            min_disk_space_mb: file.min_disk_space_mb.unwrap_or(defaults.min_disk_space_mb),
            lock_timeout: file
                .lock_timeout_secs
                .map_or(defaults.lock_timeout, Duration::from_secs),
            ..defaults
        })
    }

    /// Load the config file (if any) and merge it with `overrides`.
    pub async fn load(config_path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let file = ConfigFile::load_with_optional(config_path).await?;
        Self::resolve(file, overrides)
    }

    /// Manifest SteamCMD writes for this app.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        crate::version::VersionOracle::manifest_path_for(&self.install_dir, &self.app_id)
    }
}

/// Expand `~` and environment variables in `path` and make it absolute.
pub fn resolve_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path)
        .with_context(|| format!("Failed to expand path: {path}"))?;
    std::path::absolute(expanded.as_ref())
        .with_context(|| format!("Failed to make path absolute: {path}"))
}
