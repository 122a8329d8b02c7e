//! Free-space probing for the install volume.
//!
//! The orchestrator treats a probe failure as "unknown, proceed", so the probe
//! reports failures as a value instead of folding them into the run's error.

use std::path::{Path, PathBuf};
use thiserror::Error;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Free space observed on the volume holding a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskInfo {
    /// Bytes available to unprivileged users
    pub available_bytes: u64,
}

impl DiskInfo {
    /// Available space in whole MiB.
    #[must_use]
    pub const fn available_mb(&self) -> u64 {
        self.available_bytes / BYTES_PER_MB
    }
}

/// Why free space could not be determined.
#[derive(Debug, Error)]
#[error("Failed to query free space for {path}: {source}")]
pub struct ProbeError {
    /// Path that was probed
    pub path: PathBuf,
    /// Underlying OS error
    #[source]
    pub source: std::io::Error,
}

/// Source of free-space information.
pub trait DiskProbe {
    /// Free space on the volume containing `path`.
    fn free_space(&self, path: &Path) -> Result<DiskInfo, ProbeError>;
}

/// Probe backed by the operating system's filesystem statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fs4DiskProbe;

impl DiskProbe for Fs4DiskProbe {
    fn free_space(&self, path: &Path) -> Result<DiskInfo, ProbeError> {
        fs4::available_space(path)
            .map(|available_bytes| DiskInfo { available_bytes })
            .map_err(|source| ProbeError {
                path: path.to_path_buf(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_available_mb_rounds_down() {
        let info = DiskInfo {
            available_bytes: 3 * BYTES_PER_MB - 1,
        };
        assert_eq!(info.available_mb(), 2);
    }

    #[test]
    fn test_fs4_probe_reports_space_for_existing_dir() {
        let temp = TempDir::new().unwrap();
        let info = Fs4DiskProbe.free_space(temp.path()).unwrap();
        assert!(info.available_bytes > 0);
    }

    #[test]
    fn test_fs4_probe_fails_for_missing_path() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("does-not-exist");

        let err = Fs4DiskProbe.free_space(&missing).unwrap_err();
        assert_eq!(err.path, missing);
        assert!(err.to_string().contains("does-not-exist"));
    }
}
