//! The single result document an update run produces.
//!
//! Serialized shapes:
//!
//! ```json
//! {"status": "success", "state": "updated",
//!  "version_info": {"old_version": "100", "new_version": "205", "remote_version": "205"},
//!  "download_info": {"total_bytes": 1048576, "total_mb": 1.0, "note": "Size captured from SteamCMD log"},
//!  "paths": {"install_dir": "/srv/dst", "steamcmd_dir": "/srv/steamcmd"},
//!  "timestamp": 1717000000}
//!
//! {"status": "error", "error": {"code": "ERR_DISK", "message": "Disk Write Fail (0x6)"}}
//! ```

use serde::Serialize;
use std::path::Path;

use crate::core::ErrorClass;
use crate::version::{BuildVersion, RemoteVersion};

const DOWNLOAD_NOTE: &str = "Size captured from SteamCMD log";

/// Where the installation stands after a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Installed build already matches the public branch
    UpToDate,
    /// Nothing was installed before this run
    FreshInstalled,
    /// An existing install was updated
    Updated,
    /// Check-only run found that an update is needed
    UpdateAvailable,
}

/// Build ids before and after the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    /// Installed build before the run (`"0"` when not installed)
    pub old_version: BuildVersion,
    /// Installed build after the run
    pub new_version: BuildVersion,
    /// Public branch build, or `"unknown"`
    pub remote_version: RemoteVersion,
}

/// Download size scraped from SteamCMD progress lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadInfo {
    /// Largest total seen, in bytes
    pub total_bytes: u64,
    /// The same in MiB, rounded to two decimals
    pub total_mb: f64,
    /// Where the figure comes from
    pub note: String,
}

impl DownloadInfo {
    /// Download info for `total_bytes`.
    #[must_use]
    pub fn from_bytes(total_bytes: u64) -> Self {
        let mb = total_bytes as f64 / (1024.0 * 1024.0);
        Self {
            total_bytes,
            total_mb: (mb * 100.0).round() / 100.0,
            note: DOWNLOAD_NOTE.to_string(),
        }
    }
}

/// Directories the run used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathsInfo {
    /// Server install directory
    pub install_dir: String,
    /// SteamCMD directory
    pub steamcmd_dir: String,
}

impl PathsInfo {
    /// Paths as displayed strings.
    #[must_use]
    pub fn new(install_dir: &Path, steamcmd_dir: &Path) -> Self {
        Self {
            install_dir: install_dir.display().to_string(),
            steamcmd_dir: steamcmd_dir.display().to_string(),
        }
    }
}

/// Body of a successful outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuccessOutcome {
    /// Resulting lifecycle state
    pub state: LifecycleState,
    /// Version transition
    pub version_info: VersionInfo,
    /// Download size
    pub download_info: DownloadInfo,
    /// Directories used
    pub paths: PathsInfo,
    /// Completion time, unix seconds
    pub timestamp: i64,
}

/// Error code and message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    /// Stable class code
    pub code: ErrorClass,
    /// Human-readable description
    pub message: String,
}

/// Body of an error outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorOutcome {
    /// The failure
    pub error: ErrorBody,
}

/// Result of one invocation, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum UpdateOutcome {
    /// The run completed
    Success(SuccessOutcome),
    /// The run failed
    Error(ErrorOutcome),
}

impl UpdateOutcome {
    /// Error outcome for a classified failure.
    pub fn error(code: ErrorClass, message: impl Into<String>) -> Self {
        Self::Error(ErrorOutcome {
            error: ErrorBody {
                code,
                message: message.into(),
            },
        })
    }

    /// Whether the run completed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Process exit code for this outcome.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        if self.is_success() { 0 } else { 1 }
    }

    /// Render as JSON, compact or indented by four spaces.
    ///
    /// # Errors
    ///
    /// Only fails if serialization itself fails.
    pub fn to_json(&self, compact: bool) -> serde_json::Result<String> {
        if compact {
            return serde_json::to_string(self);
        }

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut serializer)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}
