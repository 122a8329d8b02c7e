//! Type-safe SteamCMD command builder for consistent subprocess execution
//!
//! This module provides a fluent API for building and running SteamCMD
//! invocations. Two execution styles are supported: [`SteamCmdCommand::execute`]
//! captures the whole output of short commands (the app info query), while
//! [`SteamCmdCommand::stream_lines`] hands every output line to a callback as
//! soon as it arrives, for update runs that may take hours.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::core::UpdaterError;

/// Builder for constructing and executing SteamCMD commands.
///
/// SteamCMD takes its instructions as a sequence of `+command arg...` tokens
/// executed left to right, so argument order is significant and preserved.
///
/// # Examples
///
/// ```rust,no_run
/// use dst_updater::steamcmd::command_builder::SteamCmdCommand;
/// use std::time::Duration;
///
/// # async fn example() -> anyhow::Result<()> {
/// let output = SteamCmdCommand::app_info_print("/opt/steamcmd/steamcmd.sh", "343050")
///     .with_timeout(Some(Duration::from_secs(60)))
///     .env("https_proxy", "http://10.0.0.1:3128")
///     .execute()
///     .await?;
/// println!("exit code: {:?}", output.exit_code);
/// # Ok(())
/// # }
/// ```
///
/// # Default Configuration
///
/// - **Timeout**: none (update runs are unbounded)
/// - **Environment**: inherits the parent environment plus any overrides
/// - **stdin**: closed, so SteamCMD can never block on a prompt
/// - **Child lifetime**: killed if the command future is dropped
#[derive(Debug, Clone)]
pub struct SteamCmdCommand {
    /// Path to `steamcmd.sh`
    program: PathBuf,

    /// Arguments in SteamCMD execution order
    args: Vec<String>,

    /// Environment overrides applied to the child only
    env_vars: Vec<(String, String)>,

    /// Maximum duration to wait for [`execute`](Self::execute)
    timeout_duration: Option<Duration>,

    /// Optional label included in log lines
    context: Option<String>,
}

/// Captured output of a finished SteamCMD command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SteamCmdOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit code, `None` when the process was killed by a signal
    pub exit_code: Option<i32>,
}

impl SteamCmdOutput {
    /// Whether the process exited with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout followed by stderr, the way a merged terminal log would read.
    #[must_use]
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

impl SteamCmdCommand {
    /// Creates a new command for the given SteamCMD launcher.
    pub fn new(program: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env_vars: Vec::new(),
            timeout_duration: None,
            context: None,
        }
    }

    /// Adds a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds multiple arguments, in order.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Adds an environment variable for the child process only.
    ///
    /// The parent process environment is never modified.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }

    /// Adds several environment overrides for the child process.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env_vars.extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set a timeout for [`execute`](Self::execute) (None for no timeout)
    pub const fn with_timeout(mut self, duration: Option<Duration>) -> Self {
        self.timeout_duration = duration;
        self
    }

    /// Set a label included in debug log messages
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Arguments passed to SteamCMD, in order.
    #[must_use]
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Environment overrides attached to the child.
    #[must_use]
    pub fn get_envs(&self) -> &[(String, String)] {
        &self.env_vars
    }

    fn label(&self) -> &str {
        self.context.as_deref().unwrap_or("steamcmd")
    }

    fn build(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env_vars {
            tracing::trace!(target: "steamcmd", "Setting env var for child: {}", key);
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        cmd
    }

    /// Execute the command and capture its output.
    ///
    /// A non-zero exit code is not an error here; callers inspect
    /// [`SteamCmdOutput::exit_code`]. Spawn failures and timeouts are errors.
    pub async fn execute(self) -> Result<SteamCmdOutput> {
        let start = std::time::Instant::now();
        tracing::debug!(
            target: "steamcmd",
            "({}) Executing command: {} {}",
            self.label(),
            self.program.display(),
            self.args.join(" ")
        );

        let mut cmd = self.build();
        let output_future = cmd.output();
        let output = if let Some(duration) = self.timeout_duration {
            match timeout(duration, output_future).await {
                Ok(result) => result.with_context(|| {
                    format!("Failed to execute {}", self.program.display())
                })?,
                Err(_) => {
                    tracing::warn!(
                        target: "steamcmd",
                        "({}) Command timed out after {} seconds",
                        self.label(),
                        duration.as_secs()
                    );
                    anyhow::bail!(
                        "SteamCMD command timed out after {} seconds: {}",
                        duration.as_secs(),
                        self.args.join(" ")
                    );
                }
            }
        } else {
            output_future
                .await
                .with_context(|| format!("Failed to execute {}", self.program.display()))?
        };

        let result = SteamCmdOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
        };

        tracing::debug!(
            target: "steamcmd::perf",
            "({}) Command finished with {:?} in {:.2}s",
            self.label(),
            result.exit_code,
            start.elapsed().as_secs_f64()
        );

        Ok(result)
    }

    /// Run the command, feeding every stdout/stderr line to `on_line` as it
    /// arrives, and return the exit code.
    ///
    /// Lines from both pipes are interleaved in arrival order. Invalid UTF-8 is
    /// replaced rather than treated as an error, and carriage-return separated
    /// progress updates are delivered as separate lines.
    ///
    /// # Errors
    ///
    /// - [`UpdaterError::LaunchFailed`] if the process cannot be spawned or its
    ///   output cannot be read
    /// - [`UpdaterError::Cancelled`] if `cancel` fires; the child is killed
    ///   before returning
    pub async fn stream_lines(
        self,
        on_line: &mut dyn FnMut(&str),
        cancel: &CancellationToken,
    ) -> Result<Option<i32>> {
        tracing::debug!(
            target: "steamcmd",
            "({}) Streaming command: {} {}",
            self.label(),
            self.program.display(),
            self.args.join(" ")
        );

        let mut child = self.build().spawn().map_err(|e| UpdaterError::LaunchFailed {
            reason: format!("{}: {e}", self.program.display()),
        })?;

        let stdout = child.stdout.take().ok_or_else(|| UpdaterError::LaunchFailed {
            reason: "stdout was not captured".to_string(),
        })?;
        let stderr = child.stderr.take().ok_or_else(|| UpdaterError::LaunchFailed {
            reason: "stderr was not captured".to_string(),
        })?;

        let mut stdout_segments = BufReader::new(stdout).split(b'\n');
        let mut stderr_segments = BufReader::new(stderr).split(b'\n');
        let mut stdout_open = true;
        let mut stderr_open = true;

        while stdout_open || stderr_open {
            let segment = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    terminate(&mut child, self.label()).await;
                    return Err(UpdaterError::Cancelled.into());
                }
                segment = stdout_segments.next_segment(), if stdout_open => {
                    let segment = segment.map_err(read_error)?;
                    stdout_open = segment.is_some();
                    segment
                }
                segment = stderr_segments.next_segment(), if stderr_open => {
                    let segment = segment.map_err(read_error)?;
                    stderr_open = segment.is_some();
                    segment
                }
            };

            if let Some(bytes) = segment {
                let text = String::from_utf8_lossy(&bytes);
                for line in text.split('\r') {
                    on_line(line.trim());
                }
            }
        }

        let status = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                terminate(&mut child, self.label()).await;
                return Err(UpdaterError::Cancelled.into());
            }
            status = child.wait() => status.map_err(read_error)?,
        };

        tracing::debug!(
            target: "steamcmd",
            "({}) Process exited with {:?}",
            self.label(),
            status.code()
        );
        Ok(status.code())
    }
}

fn read_error(error: std::io::Error) -> UpdaterError {
    UpdaterError::LaunchFailed {
        reason: format!("failed to read SteamCMD output: {error}"),
    }
}

async fn terminate(child: &mut Child, label: &str) {
    tracing::warn!(target: "steamcmd", "({}) Cancellation requested, killing SteamCMD", label);
    if let Err(e) = child.kill().await {
        tracing::debug!(target: "steamcmd", "({}) Failed to kill child: {}", label, e);
    }
}

// Convenience builders for the SteamCMD invocations the updater uses

impl SteamCmdCommand {
    /// Anonymous login followed by a fresh app info dump.
    pub fn app_info_print(program: impl AsRef<Path>, app_id: &str) -> Self {
        Self::new(program)
            .args(["+login", "anonymous", "+app_info_update", "1", "+app_info_print"])
            .arg(app_id)
            .arg("+quit")
            .with_context("app_info")
    }

    /// Anonymous login followed by install-or-update with file validation.
    pub fn app_update(program: impl AsRef<Path>, install_dir: &Path, app_id: &str) -> Self {
        Self::new(program)
            .arg("+force_install_dir")
            .arg(install_dir.display().to_string())
            .args(["+login", "anonymous", "+app_update"])
            .arg(app_id)
            .args(["validate", "+quit"])
            .with_context("app_update")
    }
}
