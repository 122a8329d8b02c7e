//! Retrying SteamCMD installer
//!
//! [`RetryingInstaller`] runs `app_update <app> validate` until SteamCMD reports
//! a completed install or the attempt budget is spent. Output is consumed line
//! by line as it arrives and fed through [`classifier::classify_line`]; nothing
//! is buffered until the process exits.
//!
//! # Attempt Lifecycle
//!
//! 1. Launch SteamCMD with stdout and stderr piped
//! 2. Track the largest download total seen (across *all* attempts)
//! 3. Succeed only when the exit code is 0 **and** the success marker was printed
//! 4. Otherwise classify: `0x202` is a network failure, `0x6` a disk failure,
//!    anything else a SteamCMD failure carrying the exit code
//! 5. Sleep for the retry delay (skipped after the last attempt) and go again
//!
//! When every attempt fails the last classified failure is returned. A launch
//! failure (SteamCMD could not be spawned or its pipes could not be read) only
//! replaces an earlier failure that was itself unclassified.
//!
//! # Cancellation
//!
//! The cancellation token is honoured while SteamCMD runs (the child is
//! killed) and while sleeping between attempts. Cancellation is never retried.

pub mod classifier;
pub mod install_lock;

use anyhow::Result;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::constants::{APP_ID, MAX_RETRIES, RETRY_DELAY};
use crate::core::{error_chain_message, ErrorClass, UpdaterError};
use crate::steamcmd::SteamCmdRunner;
use crate::utils::ProgressReporter;
use classifier::{classify_line, FailureMarker};

pub use install_lock::InstallLock;

/// Summary of a successful install run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallReport {
    /// Largest download total reported by SteamCMD, in bytes
    pub total_bytes: u64,
    /// Number of attempts made, including the successful one
    pub attempts: u32,
}

/// What SteamCMD said during one attempt.
#[derive(Debug, Default)]
struct AttemptLog {
    saw_success: bool,
    saw_network_error: bool,
    saw_disk_error: bool,
}

impl AttemptLog {
    fn failure(&self, exit_code: Option<i32>) -> UpdaterError {
        if self.saw_network_error {
            UpdaterError::NetworkFailure {
                marker: FailureMarker::Network.code().to_string(),
            }
        } else if self.saw_disk_error {
            UpdaterError::DiskWriteFailed {
                marker: FailureMarker::Disk.code().to_string(),
            }
        } else {
            UpdaterError::ToolFailed { exit_code }
        }
    }
}

/// Runs SteamCMD install attempts with a fixed delay between failures.
///
/// # Examples
///
/// ```rust,no_run
/// use dst_updater::installer::RetryingInstaller;
/// use dst_updater::steamcmd::SteamCmd;
/// use dst_updater::utils::NoProgress;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> anyhow::Result<()> {
/// let runner = SteamCmd::new("/opt/steamcmd/steamcmd.sh", "/srv/dst", "343050");
/// let installer = RetryingInstaller::new("343050").with_retry_delay(Duration::from_secs(5));
/// let report = installer.run(&runner, &CancellationToken::new(), &mut NoProgress).await?;
/// println!("downloaded {} bytes in {} attempts", report.total_bytes, report.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RetryingInstaller {
    app_id: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl Default for RetryingInstaller {
    fn default() -> Self {
        Self::new(APP_ID)
    }
}

impl RetryingInstaller {
    /// Installer for `app_id` with the default budget (5 attempts, 10s apart).
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            max_retries: MAX_RETRIES,
            retry_delay: RETRY_DELAY,
        }
    }

    /// Set the number of attempts. Zero is treated as one.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Set the delay between failed attempts.
    #[must_use]
    pub const fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Number of attempts this installer makes at most.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Run attempts until one succeeds, the budget is spent or `cancel` fires.
    pub async fn run<R, P>(
        &self,
        runner: &R,
        cancel: &CancellationToken,
        progress: &mut P,
    ) -> Result<InstallReport>
    where
        R: SteamCmdRunner,
        P: ProgressReporter,
    {
        let result = self.run_attempts(runner, cancel, progress).await;
        progress.finish();
        result
    }

    async fn run_attempts<R, P>(
        &self,
        runner: &R,
        cancel: &CancellationToken,
        progress: &mut P,
    ) -> Result<InstallReport>
    where
        R: SteamCmdRunner,
        P: ProgressReporter,
    {
        let mut total_bytes = 0u64;
        let mut last_failure: Option<UpdaterError> = None;

        for attempt in 1..=self.max_retries {
            if cancel.is_cancelled() {
                return Err(UpdaterError::Cancelled.into());
            }

            info!("Update attempt {attempt}/{}", self.max_retries);
            progress.attempt_started(attempt, self.max_retries);

            let failure = match self.attempt(runner, cancel, progress, &mut total_bytes).await {
                Ok(None) => {
                    info!("SteamCMD reported a completed install on attempt {attempt}");
                    return Ok(InstallReport {
                        total_bytes,
                        attempts: attempt,
                    });
                }
                Ok(Some(failure)) => failure,
                Err(UpdaterError::Cancelled) => return Err(UpdaterError::Cancelled.into()),
                Err(launch_failure) => launch_failure,
            };

            warn!("Attempt {attempt} error: {failure}");
            progress.attempt_failed(attempt, &failure.to_string());

            let masks_earlier = failure.class() == ErrorClass::Unknown
                && last_failure.as_ref().is_some_and(|earlier| earlier.class() != ErrorClass::Unknown);
            if !masks_earlier {
                last_failure = Some(failure);
            }

            if attempt < self.max_retries {
                debug!("Retrying in {:?}", self.retry_delay);
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(UpdaterError::Cancelled.into()),
                    () = tokio::time::sleep(self.retry_delay) => {}
                }
            }
        }

        Err(last_failure
            .unwrap_or_else(|| UpdaterError::Other {
                message: "No update attempts were made".to_string(),
            })
            .into())
    }

    /// One SteamCMD run.
    ///
    /// `Ok(None)` is success, `Ok(Some(_))` a classified failure and `Err(_)`
    /// a launch failure or cancellation.
    async fn attempt<R, P>(
        &self,
        runner: &R,
        cancel: &CancellationToken,
        progress: &mut P,
        total_bytes: &mut u64,
    ) -> std::result::Result<Option<UpdaterError>, UpdaterError>
    where
        R: SteamCmdRunner,
        P: ProgressReporter,
    {
        let mut log = AttemptLog::default();
        let app_id = self.app_id.as_str();

        let exit = {
            let mut on_line = |line: &str| {
                debug!(target: "steamcmd", "{line}");
                progress.line(line);

                let signal = classify_line(line, app_id);
                if let Some(bytes) = signal.progress_bytes {
                    if bytes > *total_bytes {
                        *total_bytes = bytes;
                        progress.bytes_total(bytes);
                    }
                }
                log.saw_success |= signal.success;
                match signal.error_marker {
                    Some(FailureMarker::Network) => log.saw_network_error = true,
                    Some(FailureMarker::Disk) => log.saw_disk_error = true,
                    None => {}
                }
            };
            runner.run_app_update(&mut on_line, cancel).await
        };

        match exit {
            Ok(exit_code) if exit_code == Some(0) && log.saw_success => Ok(None),
            Ok(exit_code) => Ok(Some(log.failure(exit_code))),
            Err(e) => Err(match e.downcast::<UpdaterError>() {
                Ok(updater_error) => updater_error,
                Err(other) => UpdaterError::LaunchFailed {
                    reason: error_chain_message(&other),
                },
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classify;
    use crate::test_utils::{ScriptedAttempt, ScriptedSteamCmd};
    use crate::utils::NoProgress;

    const SUCCESS: &str = "Success! App '343050' fully installed.";

    fn installer() -> RetryingInstaller {
        RetryingInstaller::new("343050").with_retry_delay(Duration::ZERO)
    }

    fn downloading(total: u64) -> String {
        format!(" Update state (0x61) downloading, progress: 10.00 ({} / {total})", total / 10)
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let runner = ScriptedSteamCmd::new()
            .with_attempt(ScriptedAttempt::exit(0).line(&downloading(5000)).line(SUCCESS));

        let report = installer().run(&runner, &CancellationToken::new(), &mut NoProgress).await.unwrap();
        assert_eq!(report, InstallReport { total_bytes: 5000, attempts: 1 });
        assert_eq!(runner.update_calls(), 1);
    }

    #[tokio::test]
    async fn test_exit_zero_without_marker_is_failure() {
        let runner = ScriptedSteamCmd::new()
            .with_attempt(ScriptedAttempt::exit(0).line("Steam>quit"))
            .with_attempt(ScriptedAttempt::exit(0).line(SUCCESS));

        let report = installer().run(&runner, &CancellationToken::new(), &mut NoProgress).await.unwrap();
        assert_eq!(report.attempts, 2);
    }

    #[tokio::test]
    async fn test_marker_with_nonzero_exit_is_failure() {
        let runner = ScriptedSteamCmd::new().with_attempt(ScriptedAttempt::exit(8).line(SUCCESS));

        let err = installer()
            .with_max_retries(1)
            .run(&runner, &CancellationToken::new(), &mut NoProgress)
            .await
            .unwrap_err();
        let (class, message) = classify(&err);
        assert_eq!(class, ErrorClass::ExternalToolFailure);
        assert_eq!(message, "SteamCMD failed (Code 8)");
    }

    #[tokio::test]
    async fn test_byte_total_is_monotonic_across_attempts() {
        let runner = ScriptedSteamCmd::new()
            .with_attempt(ScriptedAttempt::exit(1).line(&downloading(2000)).line(&downloading(9000)))
            .with_attempt(ScriptedAttempt::exit(0).line(&downloading(3000)).line(SUCCESS));

        let report = installer().run(&runner, &CancellationToken::new(), &mut NoProgress).await.unwrap();
        assert_eq!(report.total_bytes, 9000);
        assert_eq!(report.attempts, 2);
    }

    #[tokio::test]
    async fn test_retry_bound_ends_in_steamcmd_failure() {
        let runner = ScriptedSteamCmd::new().with_default_attempt(ScriptedAttempt::exit(1));

        let err = installer().run(&runner, &CancellationToken::new(), &mut NoProgress).await.unwrap_err();
        assert_eq!(runner.update_calls(), 5);
        assert_eq!(classify(&err).0, ErrorClass::ExternalToolFailure);
    }

    #[tokio::test]
    async fn test_disk_marker_on_every_attempt() {
        let runner = ScriptedSteamCmd::new().with_default_attempt(
            ScriptedAttempt::exit(2).line("Error! App '343050' state is 0x6 after update job."),
        );

        let err = installer().run(&runner, &CancellationToken::new(), &mut NoProgress).await.unwrap_err();
        assert_eq!(runner.update_calls(), 5);
        assert_eq!(classify(&err), (ErrorClass::Disk, "Disk Write Fail (0x6)".to_string()));
    }

    #[tokio::test]
    async fn test_extended_disk_code_is_a_disk_failure() {
        let runner = ScriptedSteamCmd::new().with_attempt(
            ScriptedAttempt::exit(8)
                .line(&downloading(4_096))
                .line("Error! App '343050' state is 0x602 after update job."),
        );

        let err = installer()
            .with_max_retries(1)
            .run(&runner, &CancellationToken::new(), &mut NoProgress)
            .await
            .unwrap_err();
        assert_eq!(classify(&err).0, ErrorClass::Disk);
    }

    #[tokio::test]
    async fn test_network_marker_wins_over_disk_marker() {
        let runner = ScriptedSteamCmd::new().with_attempt(
            ScriptedAttempt::exit(2)
                .line("Error! state is 0x6 after update job.")
                .line("Error! state is 0x202 after update job."),
        );

        let err = installer()
            .with_max_retries(1)
            .run(&runner, &CancellationToken::new(), &mut NoProgress)
            .await
            .unwrap_err();
        assert_eq!(classify(&err).0, ErrorClass::Network);
    }

    #[tokio::test]
    async fn test_last_classified_failure_is_reported() {
        let runner = ScriptedSteamCmd::new()
            .with_attempt(ScriptedAttempt::exit(2).line("state is 0x202"))
            .with_attempt(ScriptedAttempt::exit(3));

        let err = installer()
            .with_max_retries(2)
            .run(&runner, &CancellationToken::new(), &mut NoProgress)
            .await
            .unwrap_err();
        assert_eq!(classify(&err).1, "SteamCMD failed (Code 3)");
    }

    #[tokio::test]
    async fn test_launch_failure_does_not_mask_earlier_class() {
        let runner = ScriptedSteamCmd::new()
            .with_attempt(ScriptedAttempt::exit(2).line("state is 0x6"))
            .with_attempt(ScriptedAttempt::launch_failure("No such file or directory"));

        let err = installer()
            .with_max_retries(2)
            .run(&runner, &CancellationToken::new(), &mut NoProgress)
            .await
            .unwrap_err();
        assert_eq!(classify(&err).0, ErrorClass::Disk);
    }

    #[tokio::test]
    async fn test_launch_failure_alone_is_unknown() {
        let runner = ScriptedSteamCmd::new()
            .with_default_attempt(ScriptedAttempt::launch_failure("No such file or directory"));

        let err = installer()
            .with_max_retries(2)
            .run(&runner, &CancellationToken::new(), &mut NoProgress)
            .await
            .unwrap_err();
        let (class, message) = classify(&err);
        assert_eq!(class, ErrorClass::Unknown);
        assert!(message.contains("No such file or directory"));
    }

    #[tokio::test]
    async fn test_no_sleep_after_last_attempt() {
        let runner = ScriptedSteamCmd::new().with_default_attempt(ScriptedAttempt::exit(1));
        let installer = RetryingInstaller::new("343050")
            .with_max_retries(1)
            .with_retry_delay(Duration::from_secs(30));

        let start = std::time::Instant::now();
        let _ = installer.run(&runner, &CancellationToken::new(), &mut NoProgress).await;
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancel_during_retry_delay() {
        let runner = ScriptedSteamCmd::new().with_default_attempt(ScriptedAttempt::exit(1));
        let installer = RetryingInstaller::new("343050").with_retry_delay(Duration::from_secs(30));
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let err = installer.run(&runner, &cancel, &mut NoProgress).await.unwrap_err();
        assert_eq!(err.downcast_ref::<UpdaterError>(), Some(&UpdaterError::Cancelled));
        assert_eq!(runner.update_calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let runner = ScriptedSteamCmd::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = installer().run(&runner, &cancel, &mut NoProgress).await.unwrap_err();
        assert_eq!(classify(&err).1, "Operation cancelled");
        assert_eq!(runner.update_calls(), 0);
    }

    #[test]
    fn test_zero_retries_is_one_attempt() {
        assert_eq!(installer().with_max_retries(0).max_retries(), 1);
    }
}
