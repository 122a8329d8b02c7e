//! SteamCMD integration using the SteamCMD launcher as an opaque subprocess
//!
//! The updater never speaks the Steam content protocol itself. Everything goes
//! through `steamcmd.sh`, and the only channel back is its log text. This
//! module owns the process side of that arrangement:
//!
//! - [`command_builder`] - Fluent builder and runner for a single invocation
//! - [`bootstrap`] - Downloads and unpacks SteamCMD when it is missing
//! - [`SteamCmdRunner`] - The seam the version oracle and installer talk to,
//!   so tests can substitute scripted output for a real SteamCMD
//! - [`EnvOverrides`] - Per-child environment (proxy variables)
//!
//! # Environment Handling
//!
//! Proxy settings are attached to each child command through
//! [`EnvOverrides`]. The updater's own environment is never modified.

pub mod bootstrap;
pub mod command_builder;

use anyhow::Result;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::constants::PROXY_ENV_VARS;
use command_builder::{SteamCmdCommand, SteamCmdOutput};

/// Environment variables attached to SteamCMD child processes only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    vars: BTreeMap<String, String>,
}

impl EnvOverrides {
    /// No overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides for an optional proxy: `http_proxy`, `https_proxy` and
    /// `all_proxy` all point at the same URL.
    #[must_use]
    pub fn for_proxy(proxy: Option<&str>) -> Self {
        let mut overrides = Self::new();
        if let Some(proxy) = proxy.filter(|p| !p.is_empty()) {
            for key in PROXY_ENV_VARS {
                overrides.vars.insert(key.to_string(), proxy.to_string());
            }
        }
        overrides
    }

    /// Value of an override, if set.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Whether no overrides are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Iterate over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// The operations the updater needs from SteamCMD.
///
/// [`SteamCmd`] implements this against the real launcher; the `test-utils`
/// feature provides a scripted implementation.
pub trait SteamCmdRunner {
    /// Run the app info query and capture its output.
    ///
    /// Errors when SteamCMD cannot be started or does not finish within
    /// `timeout`. A non-zero exit code is reported in the output, not as an
    /// error.
    fn query_app_info(&self, timeout: Duration) -> impl Future<Output = Result<SteamCmdOutput>>;

    /// Run one install/update attempt, passing each output line to `on_line`
    /// as it arrives, and return the exit code.
    fn run_app_update(
        &self,
        on_line: &mut dyn FnMut(&str),
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Option<i32>>>;
}

/// SteamCMD launcher bound to one app and install directory.
#[derive(Debug, Clone)]
pub struct SteamCmd {
    executable: PathBuf,
    install_dir: PathBuf,
    app_id: String,
    env: EnvOverrides,
}

impl SteamCmd {
    /// Create a runner for `app_id`, installing into `install_dir`.
    pub fn new(
        executable: impl Into<PathBuf>,
        install_dir: impl Into<PathBuf>,
        app_id: impl Into<String>,
    ) -> Self {
        Self {
            executable: executable.into(),
            install_dir: install_dir.into(),
            app_id: app_id.into(),
            env: EnvOverrides::new(),
        }
    }

    /// Attach environment overrides to every command this runner starts.
    #[must_use]
    pub fn with_env(mut self, env: EnvOverrides) -> Self {
        if let Some(proxy) = env.get("https_proxy") {
            tracing::debug!(target: "steamcmd", "SteamCMD traffic goes through proxy {proxy}");
        }
        self.env = env;
        self
    }

    /// Path to `steamcmd.sh`.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn apply_env(&self, cmd: SteamCmdCommand) -> SteamCmdCommand {
        cmd.envs(self.env.iter())
    }
}

impl SteamCmdRunner for SteamCmd {
    async fn query_app_info(&self, timeout: Duration) -> Result<SteamCmdOutput> {
        self.apply_env(SteamCmdCommand::app_info_print(&self.executable, &self.app_id))
            .with_timeout(Some(timeout))
            .execute()
            .await
    }

    async fn run_app_update(
        &self,
        on_line: &mut dyn FnMut(&str),
        cancel: &CancellationToken,
    ) -> Result<Option<i32>> {
        self.apply_env(SteamCmdCommand::app_update(
            &self.executable,
            &self.install_dir,
            &self.app_id,
        ))
        .stream_lines(on_line, cancel)
        .await
    }
}
