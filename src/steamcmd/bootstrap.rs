//! SteamCMD bootstrap: download and unpack the launcher when it is missing.
//!
//! The archive is fetched with `reqwest` (honouring the configured proxy),
//! written next to its destination, unpacked with `flate2` + `tar` on a
//! blocking thread and then removed. A directory that already contains
//! `steamcmd.sh` is left alone.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::constants::{STEAMCMD_ARCHIVE, STEAMCMD_EXECUTABLE};
use crate::core::{error_chain_message, UpdaterError};
use crate::utils::{ensure_dir, file_exists, make_executable};

/// Installs SteamCMD into a directory on demand.
#[derive(Debug, Clone)]
pub struct ToolBootstrap {
    steamcmd_dir: PathBuf,
    url: String,
    proxy: Option<String>,
}

impl ToolBootstrap {
    /// Bootstrap into `steamcmd_dir` from the archive at `url`.
    pub fn new(steamcmd_dir: impl Into<PathBuf>, url: impl Into<String>) -> Self {
        Self {
            steamcmd_dir: steamcmd_dir.into(),
            url: url.into(),
            proxy: None,
        }
    }

    /// Route the download through a proxy.
    #[must_use]
    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy.filter(|p| !p.is_empty());
        self
    }

    /// Path of the launcher script this bootstrap provides.
    #[must_use]
    pub fn executable(&self) -> PathBuf {
        self.steamcmd_dir.join(STEAMCMD_EXECUTABLE)
    }

    /// Make sure `steamcmd.sh` exists, downloading it if needed.
    ///
    /// Returns the launcher path.
    ///
    /// # Errors
    ///
    /// - [`UpdaterError::PermissionDenied`] when the directory cannot be created
    /// - [`UpdaterError::ToolInstallFailed`] when the download or unpack fails
    /// - [`UpdaterError::ToolMissing`] when the archive did not contain the launcher
    pub async fn ensure_installed(&self) -> Result<PathBuf> {
        let executable = self.executable();
        if file_exists(&executable).await {
            debug!("SteamCMD already present at {}", executable.display());
            return Ok(executable);
        }

        ensure_dir(&self.steamcmd_dir).await?;

        info!("Installing SteamCMD into {}", self.steamcmd_dir.display());
        let archive = self.steamcmd_dir.join(STEAMCMD_ARCHIVE);
        let installed = async {
            self.download(&archive).await?;
            install_from_archive(&archive, &self.steamcmd_dir).await
        }
        .await;
        let _ = tokio::fs::remove_file(&archive).await;

        installed.map_err(|e| match e.downcast::<UpdaterError>() {
            Ok(updater_error) => updater_error,
            Err(other) => UpdaterError::ToolInstallFailed {
                reason: error_chain_message(&other),
            },
        })?;

        if !file_exists(&executable).await {
            return Err(UpdaterError::ToolMissing {
                path: executable.display().to_string(),
            }
            .into());
        }
        make_executable(&executable).await?;

        info!("SteamCMD installed");
        Ok(executable)
    }

    async fn download(&self, dest: &Path) -> Result<()> {
        debug!("Downloading SteamCMD from {}", self.url);

        let mut builder = reqwest::Client::builder();
        if let Some(proxy) = &self.proxy {
            builder = builder
                .proxy(reqwest::Proxy::all(proxy).context("Invalid proxy URL")?);
        }
        let client = builder.build().context("Failed to build HTTP client")?;

        let response = client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", self.url))?;
        if !response.status().is_success() {
            anyhow::bail!("Download failed with HTTP {}", response.status());
        }

        let bytes = response.bytes().await.context("Failed to read SteamCMD archive")?;
        tokio::fs::write(dest, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", dest.display()))?;

        debug!("Downloaded {} bytes", bytes.len());
        Ok(())
    }
}

/// Unpack a gzip-compressed tarball into `dest`.
pub async fn install_from_archive(archive: &Path, dest: &Path) -> Result<()> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let file = std::fs::File::open(&archive)
            .with_context(|| format!("Failed to open {}", archive.display()))?;
        let decoder = flate2::read::GzDecoder::new(file);
        tar::Archive::new(decoder)
            .unpack(&dest)
            .with_context(|| format!("Failed to unpack {}", archive.display()))
    })
    .await
    .context("Failed to join unpack task")?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{classify, ErrorClass};
    use tempfile::TempDir;

    fn write_tarball(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, data) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[tokio::test]
    async fn test_skips_when_launcher_exists() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(STEAMCMD_EXECUTABLE), "#!/bin/sh\n").unwrap();

        // The URL is never contacted
        let bootstrap = ToolBootstrap::new(temp.path(), "http://127.0.0.1:9/unreachable");
        let path = bootstrap.ensure_installed().await.unwrap();
        assert_eq!(path, temp.path().join(STEAMCMD_EXECUTABLE));
    }

    #[tokio::test]
    async fn test_install_from_archive_unpacks_files() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("steamcmd.tar.gz");
        write_tarball(
            &archive,
            &[("steamcmd.sh", b"#!/bin/sh\n"), ("linux32/steamcmd", b"elf")],
        );

        let dest = temp.path().join("out");
        std::fs::create_dir(&dest).unwrap();
        install_from_archive(&archive, &dest).await.unwrap();

        assert!(dest.join("steamcmd.sh").is_file());
        assert!(dest.join("linux32/steamcmd").is_file());
    }

    #[tokio::test]
    async fn test_install_from_corrupt_archive_fails() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("steamcmd.tar.gz");
        std::fs::write(&archive, b"not a tarball").unwrap();

        let result = install_from_archive(&archive, temp.path()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_url_classifies_as_network() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("steamcmd");

        let bootstrap = ToolBootstrap::new(&dir, "http://127.0.0.1:9/steamcmd_linux.tar.gz");
        let err = bootstrap.ensure_installed().await.unwrap_err();

        let (class, message) = classify(&err);
        assert_eq!(class, ErrorClass::Network);
        assert!(message.starts_with("Failed to install SteamCMD"));
        assert!(!dir.join(STEAMCMD_ARCHIVE).exists());
    }

    #[test]
    fn test_empty_proxy_is_ignored() {
        let bootstrap = ToolBootstrap::new("/tmp/steamcmd", "http://x").with_proxy(Some(String::new()));
        assert!(bootstrap.proxy.is_none());
    }
}
