//! Install directory locking for cross-process coordination.
//!
//! Two updaters running `app_update` against the same directory would
//! interleave their writes. [`InstallLock`] takes an exclusive advisory lock
//! on `<install_dir>/.dst-updater.lock` for the duration of the install
//! sequence and releases it on drop.
//!
//! # Async Safety
//!
//! File operations run in `spawn_blocking` so waiting for the lock never
//! blocks a runtime worker.

use crate::constants::{
    INSTALL_LOCK_FILE, MAX_BACKOFF_DELAY_MS, STARTING_BACKOFF_DELAY_MS, default_lock_timeout,
};
use crate::core::UpdaterError;
use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::debug;

/// An exclusive lock on an install directory.
///
/// The lock file is left in place after release, so every process locks the
/// same inode.
///
/// # Example
///
/// ```rust,no_run
/// use dst_updater::installer::install_lock::InstallLock;
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let _lock = InstallLock::acquire(Path::new("/home/container/games/dst")).await?;
/// // run SteamCMD...
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct InstallLock {
    /// The file handle; the lock is released when this is dropped
    _file: Arc<File>,
    lock_path: PathBuf,
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        debug!(lock = %self.lock_path.display(), "Install lock released");
    }
}

impl InstallLock {
    /// Acquires the lock with the default 30 second timeout.
    pub async fn acquire(install_dir: &Path) -> Result<Self> {
        Self::acquire_with_timeout(install_dir, default_lock_timeout()).await
    }

    /// Acquires the lock, waiting at most `timeout`.
    ///
    /// Polls `try_lock_exclusive()` with exponential backoff (10ms up to
    /// 500ms between tries).
    ///
    /// # Errors
    ///
    /// [`UpdaterError::InstallLocked`] if another process still holds the lock
    /// when the timeout expires; an I/O error if the lock file cannot be
    /// opened.
    pub async fn acquire_with_timeout(install_dir: &Path, timeout: Duration) -> Result<Self> {
        let lock_path = install_dir.join(INSTALL_LOCK_FILE);
        debug!(lock = %lock_path.display(), "Waiting for install lock");

        let open_path = lock_path.clone();
        let file = tokio::task::spawn_blocking(move || {
            OpenOptions::new().create(true).write(true).truncate(false).open(&open_path)
        })
        .await
        .context("spawn_blocking panicked")?
        .with_context(|| format!("Failed to open lock file: {}", lock_path.display()))?;
        let file = Arc::new(file);

        let start = std::time::Instant::now();
        let backoff = ExponentialBackoff::from_millis(STARTING_BACKOFF_DELAY_MS)
            .max_delay(Duration::from_millis(MAX_BACKOFF_DELAY_MS));

        for delay in backoff {
            let file_clone = Arc::clone(&file);
            let lock_result = tokio::task::spawn_blocking(move || file_clone.try_lock_exclusive())
                .await
                .context("spawn_blocking panicked")?;

            if let Ok(true) = lock_result {
                debug!(
                    lock = %lock_path.display(),
                    wait_ms = start.elapsed().as_millis(),
                    "Install lock acquired"
                );
                return Ok(Self {
                    _file: file,
                    lock_path,
                });
            }

            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                break;
            }
            tokio::time::sleep(delay.min(remaining)).await;
        }

        Err(UpdaterError::InstallLocked {
            path: install_dir.display().to_string(),
        }
        .into())
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{classify, ErrorClass};
    use std::time::Instant;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_install_lock_acquire_and_release() {
        let temp_dir = TempDir::new().unwrap();

        let lock = InstallLock::acquire(temp_dir.path()).await.unwrap();
        assert_eq!(lock.path(), temp_dir.path().join(INSTALL_LOCK_FILE));
        assert!(lock.path().exists());
        drop(lock);

        // Re-acquiring after release is immediate
        let start = Instant::now();
        let _lock = InstallLock::acquire(temp_dir.path()).await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_install_lock_exclusive_blocking() {
        use tokio::sync::Barrier;

        let temp_dir = TempDir::new().unwrap();
        let install_dir = Arc::new(temp_dir.path().to_path_buf());
        let barrier = Arc::new(Barrier::new(2));

        let dir1 = install_dir.clone();
        let barrier1 = barrier.clone();
        let holder = tokio::spawn(async move {
            let _lock = InstallLock::acquire(&dir1).await.unwrap();
            barrier1.wait().await;
            tokio::time::sleep(Duration::from_millis(100)).await;
        });

        let dir2 = install_dir.clone();
        let waiter = tokio::spawn(async move {
            barrier.wait().await;
            let start = Instant::now();
            let _lock = InstallLock::acquire(&dir2).await.unwrap();
            assert!(start.elapsed() >= Duration::from_millis(50));
        });

        holder.await.unwrap();
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_install_lock_timeout_is_classified() {
        let temp_dir = TempDir::new().unwrap();
        let _held = InstallLock::acquire(temp_dir.path()).await.unwrap();

        let start = Instant::now();
        let err = InstallLock::acquire_with_timeout(temp_dir.path(), Duration::from_millis(100))
            .await
            .unwrap_err();
        let elapsed = start.elapsed();

        let (class, message) = classify(&err);
        assert_eq!(class, ErrorClass::Unknown);
        assert!(message.contains("locked by another process"), "{message}");
        assert!(elapsed >= Duration::from_millis(50), "Timeout too quick: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1000), "Timeout too slow: {elapsed:?}");
    }
}
