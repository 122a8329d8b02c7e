//! File system helpers for the install and SteamCMD directories.

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::Path;

use crate::core::UpdaterError;

/// Ensures a directory exists, creating it and any missing parents.
///
/// A permission failure is reported as [`UpdaterError::PermissionDenied`] so it
/// classifies as `ERR_PERMISSION`. Other failures keep their I/O cause.
///
/// # Examples
///
/// ```rust,no_run
/// use dst_updater::utils::ensure_dir;
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// ensure_dir(Path::new("/home/container/games/dst")).await?;
/// # Ok(())
/// # }
/// ```
pub async fn ensure_dir(path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => return Ok(()),
        Ok(_) => {
            return Err(anyhow::anyhow!(
                "Path exists but is not a directory: {}",
                path.display()
            ));
        }
        Err(_) => {}
    }

    match tokio::fs::create_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e)
            if matches!(e.kind(), ErrorKind::PermissionDenied | ErrorKind::ReadOnlyFilesystem) =>
        {
            Err(UpdaterError::PermissionDenied {
                path: path.display().to_string(),
            }
            .into())
        }
        Err(e) => {
            Err(e).with_context(|| format!("Failed to create directory: {}", path.display()))
        }
    }
}

/// Whether `path` exists as a regular file.
pub async fn file_exists(path: &Path) -> bool {
    tokio::fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

/// Marks a file executable for its owner, group and others.
#[cfg(unix)]
pub async fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Failed to read metadata: {}", path.display()))?
        .permissions();
    perms.set_mode(perms.mode() | 0o755);
    tokio::fs::set_permissions(path, perms)
        .await
        .with_context(|| format!("Failed to set permissions: {}", path.display()))
}

#[cfg(not(unix))]
pub async fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{classify, ErrorClass};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_ensure_dir_creates_nested() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b").join("c");

        ensure_dir(&nested).await.unwrap();
        assert!(nested.is_dir());

        // Second call is a no-op
        ensure_dir(&nested).await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_dir_rejects_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file");
        std::fs::write(&file, "x").unwrap();

        let err = ensure_dir(&file).await.unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_ensure_dir_permission_denied_classifies() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let locked = temp.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o500)).unwrap();

        // Privileged users can write anyway; nothing to assert then
        if std::fs::create_dir(locked.join("probe")).is_ok() {
            std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o700)).unwrap();
            return;
        }

        let err = ensure_dir(&locked.join("dst")).await.unwrap_err();
        let (class, message) = classify(&err);
        assert_eq!(class, ErrorClass::Permission);
        assert!(message.starts_with("No write permission"));

        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o700)).unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_make_executable() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let script = temp.path().join("steamcmd.sh");
        std::fs::write(&script, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o644)).unwrap();

        make_executable(&script).await.unwrap();
        let mode = std::fs::metadata(&script).unwrap().permissions().mode();
        assert_eq!(mode & 0o755, 0o755);
        assert!(file_exists(&script).await);
    }
}
