//! Update orchestration
//!
//! [`UpdateOrchestrator`] sequences one invocation:
//!
//! 1. Make sure SteamCMD is installed
//! 2. Make sure the install directory exists
//! 3. Read the local build and query the remote build (neither can fail)
//! 4. [`decide`] whether an update is required
//! 5. If so: check free space, lock the install directory, run the retrying
//!    installer, re-read the local build and verify the server binary
//!
//! Any failure along the way is caught once, in
//! [`UpdateOrchestrator::execute`], and turned into the error
//! [`UpdateOutcome`].

pub mod outcome;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::UpdaterConfig;
use crate::constants::VALIDATION_BINARY;
use crate::core::{classify, UpdaterError};
use crate::installer::{InstallLock, RetryingInstaller};
use crate::steamcmd::bootstrap::ToolBootstrap;
use crate::steamcmd::SteamCmdRunner;
use crate::utils::{ensure_dir, file_exists, DiskProbe, ProgressReporter};
use crate::version::{BuildVersion, RemoteVersion, VersionOracle};

pub use outcome::{
    DownloadInfo, ErrorBody, ErrorOutcome, LifecycleState, PathsInfo, SuccessOutcome,
    UpdateOutcome, VersionInfo,
};

/// Why an update is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateReason {
    /// `--force` was given
    Forced,
    /// The remote build could not be determined
    RemoteUnknown,
    /// Local and remote builds differ
    VersionMismatch,
}

/// Whether to run SteamCMD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDecision {
    /// The installed build is current
    NoUpdateNeeded,
    /// An update must run
    UpdateRequired(UpdateReason),
}

/// Decide whether to update.
///
/// Forced beats everything; an unknown remote build always updates; otherwise
/// any difference between the build ids updates.
#[must_use]
pub fn decide(local: &BuildVersion, remote: &RemoteVersion, force: bool) -> UpdateDecision {
    if force {
        return UpdateDecision::UpdateRequired(UpdateReason::Forced);
    }
    match remote {
        RemoteVersion::Unknown => UpdateDecision::UpdateRequired(UpdateReason::RemoteUnknown),
        RemoteVersion::Known(remote) if remote != local => {
            UpdateDecision::UpdateRequired(UpdateReason::VersionMismatch)
        }
        RemoteVersion::Known(_) => UpdateDecision::NoUpdateNeeded,
    }
}

/// Runs one update invocation against a SteamCMD runner and disk probe.
pub struct UpdateOrchestrator<R, D> {
    config: UpdaterConfig,
    runner: R,
    disk_probe: D,
    bootstrap: ToolBootstrap,
    oracle: VersionOracle,
    installer: RetryingInstaller,
}

impl<R, D> UpdateOrchestrator<R, D>
where
    R: SteamCmdRunner,
    D: DiskProbe,
{
    /// Wire an orchestrator from resolved configuration.
    pub fn new(config: UpdaterConfig, runner: R, disk_probe: D) -> Self {
        let bootstrap = ToolBootstrap::new(&config.steamcmd_dir, config.steamcmd_url.clone())
            .with_proxy(config.proxy.clone());
        let oracle = VersionOracle::new(config.manifest_path(), config.query_timeout);
        let installer = RetryingInstaller::new(config.app_id.clone())
            .with_max_retries(config.max_retries)
            .with_retry_delay(config.retry_delay);

        Self {
            config,
            runner,
            disk_probe,
            bootstrap,
            oracle,
            installer,
        }
    }

    /// The runner this orchestrator drives.
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run the invocation and produce its outcome. Never fails.
    pub async fn execute<P: ProgressReporter>(
        &self,
        cancel: &CancellationToken,
        progress: &mut P,
    ) -> UpdateOutcome {
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(UpdaterError::Cancelled.into()),
            result = self.run(cancel, progress) => result,
        };

        match result {
            Ok(success) => UpdateOutcome::Success(success),
            Err(e) => {
                let (class, message) = classify(&e);
                error!("Update failed [{class}]: {e:#}");
                UpdateOutcome::error(class, message)
            }
        }
    }

    async fn run<P: ProgressReporter>(
        &self,
        cancel: &CancellationToken,
        progress: &mut P,
    ) -> Result<SuccessOutcome> {
        self.bootstrap.ensure_installed().await?;
        ensure_dir(&self.config.install_dir).await?;

        let old_version = self.oracle.get_local_version().await;
        let remote_version = self.oracle.get_remote_version(&self.runner).await;
        info!("Installed build: {old_version}, public build: {remote_version}");

        let reason = match decide(&old_version, &remote_version, self.config.force) {
            UpdateDecision::NoUpdateNeeded => {
                info!("Server is up to date");
                return Ok(self.success(
                    LifecycleState::UpToDate,
                    old_version.clone(),
                    old_version,
                    remote_version,
                    0,
                ));
            }
            UpdateDecision::UpdateRequired(reason) => reason,
        };

        match reason {
            UpdateReason::Forced => info!("Forced update requested"),
            UpdateReason::RemoteUnknown => warn!("Public build unknown, updating to be safe"),
            UpdateReason::VersionMismatch => {
                info!("Update available: {old_version} -> {remote_version}");
            }
        }

        if self.config.check_only {
            return Ok(self.success(
                LifecycleState::UpdateAvailable,
                old_version.clone(),
                old_version,
                remote_version,
                0,
            ));
        }

        self.check_disk_space()?;
        let _lock =
            InstallLock::acquire_with_timeout(&self.config.install_dir, self.config.lock_timeout)
                .await?;

        let report = self.installer.run(&self.runner, cancel, progress).await?;
        let new_version = self.oracle.get_local_version().await;
        self.verify_server_binary().await?;

        let state = if old_version.is_not_installed() {
            LifecycleState::FreshInstalled
        } else {
            LifecycleState::Updated
        };
        info!("Install complete: {old_version} -> {new_version}");

        Ok(self.success(state, old_version, new_version, remote_version, report.total_bytes))
    }

    fn check_disk_space(&self) -> Result<()> {
        let required_mb = self.config.min_disk_space_mb;
        match self.disk_probe.free_space(&self.config.install_dir) {
            Ok(info) if info.available_mb() < required_mb => {
                Err(UpdaterError::InsufficientDiskSpace {
                    free_mb: info.available_mb(),
                    required_mb,
                }
                .into())
            }
            Ok(info) => {
                debug!("Free space: {}MB", info.available_mb());
                Ok(())
            }
            Err(e) => {
                warn!("{e}; continuing without a disk space check");
                Ok(())
            }
        }
    }

    async fn verify_server_binary(&self) -> Result<()> {
        let binary = self.config.install_dir.join(VALIDATION_BINARY);
        if file_exists(&binary).await {
            Ok(())
        } else {
            Err(UpdaterError::ServerBinaryMissing {
                path: binary.display().to_string(),
            }
            .into())
        }
    }

    fn success(
        &self,
        state: LifecycleState,
        old_version: BuildVersion,
        new_version: BuildVersion,
        remote_version: RemoteVersion,
        total_bytes: u64,
    ) -> SuccessOutcome {
        SuccessOutcome {
            state,
            version_info: VersionInfo {
                old_version,
                new_version,
                remote_version,
            },
            download_info: DownloadInfo::from_bytes(total_bytes),
            paths: PathsInfo::new(&self.config.install_dir, &self.config.steamcmd_dir),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(id: &str) -> RemoteVersion {
        RemoteVersion::Known(BuildVersion::new(id))
    }

    #[test]
    fn test_decide_same_version() {
        assert_eq!(
            decide(&BuildVersion::new("100"), &known("100"), false),
            UpdateDecision::NoUpdateNeeded
        );
    }

    #[test]
    fn test_decide_mismatch() {
        assert_eq!(
            decide(&BuildVersion::new("100"), &known("205"), false),
            UpdateDecision::UpdateRequired(UpdateReason::VersionMismatch)
        );
        assert_eq!(
            decide(&BuildVersion::not_installed(), &known("205"), false),
            UpdateDecision::UpdateRequired(UpdateReason::VersionMismatch)
        );
    }

    #[test]
    fn test_decide_unknown_remote_forces_update() {
        assert_eq!(
            decide(&BuildVersion::new("100"), &RemoteVersion::Unknown, false),
            UpdateDecision::UpdateRequired(UpdateReason::RemoteUnknown)
        );
    }

    #[test]
    fn test_decide_force_wins() {
        assert_eq!(
            decide(&BuildVersion::new("100"), &known("100"), true),
            UpdateDecision::UpdateRequired(UpdateReason::Forced)
        );
    }
}
