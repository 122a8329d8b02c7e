//! Test utilities for dst-updater
//!
//! This module provides fakes for the two seams an update run talks to, so
//! orchestrator and installer behaviour can be tested without SteamCMD or a
//! particular filesystem:
//!
//! - [`ScriptedSteamCmd`] - A [`SteamCmdRunner`] that replays canned output
//! - [`FixedDiskProbe`] - A [`DiskProbe`] reporting a fixed amount of free space
//!
//! Both are available to unit tests and, through the `test-utils` feature, to
//! integration tests.
//!
//! # Example
//!
//! ```rust,no_run
//! use dst_updater::test_utils::{ScriptedAttempt, ScriptedSteamCmd};
//!
//! let runner = ScriptedSteamCmd::new()
//!     .with_remote_build("205")
//!     .with_attempt(
//!         ScriptedAttempt::exit(0)
//!             .line("Success! App '343050' fully installed.")
//!             .writes_manifest("205"),
//!     );
//! ```

use anyhow::Result;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, Once};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::constants::VALIDATION_BINARY;
use crate::core::UpdaterError;
use crate::steamcmd::command_builder::SteamCmdOutput;
use crate::steamcmd::SteamCmdRunner;
use crate::utils::{DiskInfo, DiskProbe, ProbeError};

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging based on `RUST_LOG` or an explicit level.
///
/// Safe to call from many tests; only the first call installs a subscriber.
/// With no level and no `RUST_LOG`, nothing is logged.
///
/// ```bash
/// RUST_LOG=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}

/// Manifest text SteamCMD would leave behind for `build_id`.
#[must_use]
pub fn manifest_text(build_id: &str) -> String {
    format!(
        "\"AppState\"\n{{\n\t\"appid\"\t\t\"343050\"\n\t\"buildid\"\t\t\"{build_id}\"\n}}\n"
    )
}

/// `app_info_print` output whose public branch is at `build_id`.
#[must_use]
pub fn app_info_text(build_id: &str) -> String {
    format!(
        "\"343050\"\n{{\n\t\"depots\"\n\t{{\n\t\t\"branches\"\n\t\t{{\n\t\t\t\"public\"\n\t\t\t{{\n\t\t\t\t\"buildid\"\t\t\"{build_id}\"\n\t\t\t}}\n\t\t}}\n\t}}\n}}\n"
    )
}

/// Write an app manifest for `build_id` under `install_dir`.
pub fn write_manifest(install_dir: &Path, build_id: &str) -> std::io::Result<()> {
    let dir = install_dir.join("steamapps");
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join("appmanifest_343050.acf"), manifest_text(build_id))
}

/// Create the server binary the post-install check looks for.
pub fn write_server_binary(install_dir: &Path) -> std::io::Result<()> {
    let binary = install_dir.join(VALIDATION_BINARY);
    if let Some(parent) = binary.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(binary, b"")
}

/// One scripted `app_update` run.
#[derive(Debug, Clone)]
pub struct ScriptedAttempt {
    lines: Vec<String>,
    result: std::result::Result<Option<i32>, String>,
    manifest_build: Option<String>,
}

impl ScriptedAttempt {
    /// An attempt that prints nothing and exits with `code`.
    #[must_use]
    pub fn exit(code: i32) -> Self {
        Self {
            lines: Vec::new(),
            result: Ok(Some(code)),
            manifest_build: None,
        }
    }

    /// An attempt whose process could not be started.
    #[must_use]
    pub fn launch_failure(reason: &str) -> Self {
        Self {
            lines: Vec::new(),
            result: Err(reason.to_string()),
            manifest_build: None,
        }
    }

    /// Print a line.
    #[must_use]
    pub fn line(mut self, line: &str) -> Self {
        self.lines.push(line.to_string());
        self
    }

    /// Write a manifest with `build_id` (and the server binary) into the
    /// install directory, the way a real successful install would.
    #[must_use]
    pub fn writes_manifest(mut self, build_id: &str) -> Self {
        self.manifest_build = Some(build_id.to_string());
        self
    }
}

/// A [`SteamCmdRunner`] that replays scripted output.
///
/// Attempts are consumed in order; once the queue is empty the default
/// attempt (if any) repeats forever, otherwise the run fails to launch.
#[derive(Debug, Default)]
pub struct ScriptedSteamCmd {
    install_dir: Option<PathBuf>,
    query: Option<std::result::Result<SteamCmdOutput, String>>,
    query_delay: Option<Duration>,
    attempts: Mutex<VecDeque<ScriptedAttempt>>,
    default_attempt: Option<ScriptedAttempt>,
    query_calls: AtomicU32,
    update_calls: AtomicU32,
}

impl ScriptedSteamCmd {
    /// A runner with no scripted behaviour.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory [`ScriptedAttempt::writes_manifest`] writes into.
    #[must_use]
    pub fn with_install_dir(mut self, install_dir: &Path) -> Self {
        self.install_dir = Some(install_dir.to_path_buf());
        self
    }

    /// Answer the app info query with a public build.
    #[must_use]
    pub fn with_remote_build(mut self, build_id: &str) -> Self {
        self.query = Some(Ok(SteamCmdOutput {
            stdout: app_info_text(build_id),
            stderr: String::new(),
            exit_code: Some(0),
        }));
        self
    }

    /// Answer the app info query with arbitrary output.
    #[must_use]
    pub fn with_query_output(mut self, output: SteamCmdOutput) -> Self {
        self.query = Some(Ok(output));
        self
    }

    /// Fail the app info query the way a timeout does.
    #[must_use]
    pub fn with_query_timeout(mut self) -> Self {
        self.query = Some(Err("SteamCMD command timed out".to_string()));
        self
    }

    /// Hold the app info query for `delay` before answering.
    #[must_use]
    pub fn with_query_delay(mut self, delay: Duration) -> Self {
        self.query_delay = Some(delay);
        self
    }

    /// Queue an update attempt.
    #[must_use]
    pub fn with_attempt(self, attempt: ScriptedAttempt) -> Self {
        if let Ok(mut queue) = self.attempts.lock() {
            queue.push_back(attempt);
        }
        self
    }

    /// Attempt used once the queue is empty.
    #[must_use]
    pub fn with_default_attempt(mut self, attempt: ScriptedAttempt) -> Self {
        self.default_attempt = Some(attempt);
        self
    }

    /// Number of app info queries made.
    pub fn query_calls(&self) -> u32 {
        self.query_calls.load(Ordering::SeqCst)
    }

    /// Number of update attempts made.
    pub fn update_calls(&self) -> u32 {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn next_attempt(&self) -> Option<ScriptedAttempt> {
        let queued = self.attempts.lock().ok().and_then(|mut queue| queue.pop_front());
        queued.or_else(|| self.default_attempt.clone())
    }
}

impl SteamCmdRunner for ScriptedSteamCmd {
    async fn query_app_info(&self, timeout: Duration) -> Result<SteamCmdOutput> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.query_delay {
            if tokio::time::timeout(timeout, tokio::time::sleep(delay)).await.is_err() {
                anyhow::bail!("SteamCMD command timed out after {timeout:?}");
            }
        }

        match &self.query {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(message)) => Err(anyhow::anyhow!("{message}")),
            None => Ok(SteamCmdOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: Some(0),
            }),
        }
    }

    async fn run_app_update(
        &self,
        on_line: &mut dyn FnMut(&str),
        cancel: &CancellationToken,
    ) -> Result<Option<i32>> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);

        if cancel.is_cancelled() {
            return Err(UpdaterError::Cancelled.into());
        }

        let Some(attempt) = self.next_attempt() else {
            return Err(UpdaterError::LaunchFailed {
                reason: "no scripted attempt".to_string(),
            }
            .into());
        };

        let exit_code = match attempt.result {
            Ok(code) => code,
            Err(reason) => {
                return Err(UpdaterError::LaunchFailed { reason }.into());
            }
        };

        for line in &attempt.lines {
            on_line(line);
        }

        if let (Some(build), Some(dir)) = (&attempt.manifest_build, &self.install_dir) {
            write_manifest(dir, build)?;
            write_server_binary(dir)?;
        }

        Ok(exit_code)
    }
}

/// A [`DiskProbe`] with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedDiskProbe {
    available_mb: Option<u64>,
}

impl FixedDiskProbe {
    /// Report `available_mb` MiB free.
    #[must_use]
    pub const fn available_mb(available_mb: u64) -> Self {
        Self {
            available_mb: Some(available_mb),
        }
    }

    /// Fail every probe.
    #[must_use]
    pub const fn failing() -> Self {
        Self {
            available_mb: None,
        }
    }
}

impl DiskProbe for FixedDiskProbe {
    fn free_space(&self, path: &Path) -> std::result::Result<DiskInfo, ProbeError> {
        match self.available_mb {
            Some(mb) => Ok(DiskInfo {
                available_bytes: mb * 1024 * 1024,
            }),
            None => Err(ProbeError {
                path: path.to_path_buf(),
                source: std::io::Error::other("statvfs unavailable"),
            }),
        }
    }
}
