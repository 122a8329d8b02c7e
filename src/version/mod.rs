//! Build version detection for the installed and published server
//!
//! Steam identifies a build by an opaque numeric-looking `buildid`. This module
//! reads it from two places:
//!
//! - The local app manifest (`steamapps/appmanifest_<app>.acf`) written by
//!   SteamCMD after every install
//! - The `public` branch of the app info SteamCMD prints for
//!   `+app_info_print <app>`
//!
//! Neither lookup is allowed to fail a run. A missing or unreadable manifest
//! means "not installed" ([`BuildVersion::not_installed`]), and a remote query
//! that times out, exits non-zero or prints something unexpected yields
//! [`RemoteVersion::Unknown`], which forces an update.
//!
//! Build ids are compared as strings only. They are never parsed as numbers,
//! so there is no notion of an "older" remote build.

use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

use crate::constants::NOT_INSTALLED_BUILD;
use crate::steamcmd::SteamCmdRunner;

static BUILD_ID_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r#""buildid"\s+"(\d+)""#));

static PUBLIC_BRANCH_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r#"(?s)"branches"\s*\{.*?"public"\s*\{(.*?)\}"#));

/// An opaque build identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BuildVersion(String);

impl BuildVersion {
    /// Wrap a build id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The `"0"` sentinel used when nothing is installed.
    #[must_use]
    pub fn not_installed() -> Self {
        Self(NOT_INSTALLED_BUILD.to_string())
    }

    /// Whether this is the not-installed sentinel.
    #[must_use]
    pub fn is_not_installed(&self) -> bool {
        self.0 == NOT_INSTALLED_BUILD
    }

    /// The raw build id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The build currently published on the public branch, if it could be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteVersion {
    /// The public branch build id
    Known(BuildVersion),
    /// The query failed or its output could not be parsed
    Unknown,
}

impl fmt::Display for RemoteVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(version) => version.fmt(f),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

impl Serialize for RemoteVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Known(version) => version.serialize(serializer),
            Self::Unknown => serializer.serialize_str("unknown"),
        }
    }
}

/// Extract the `buildid` value from app manifest text.
#[must_use]
pub fn parse_manifest_build_id(manifest: &str) -> Option<BuildVersion> {
    let re = BUILD_ID_RE.as_ref().ok()?;
    re.captures(manifest)
        .and_then(|caps| caps.get(1))
        .map(|m| BuildVersion::new(m.as_str()))
}

/// Extract the public branch `buildid` from `app_info_print` output.
///
/// Only the first `"public"` block inside `"branches"` is considered, and the
/// build id must appear inside that block.
#[must_use]
pub fn parse_public_build_id(app_info: &str) -> Option<BuildVersion> {
    let re = PUBLIC_BRANCH_RE.as_ref().ok()?;
    let block = re.captures(app_info)?.get(1)?.as_str();
    parse_manifest_build_id(block)
}

/// Looks up local and remote build ids for one app.
#[derive(Debug, Clone)]
pub struct VersionOracle {
    manifest_path: PathBuf,
    query_timeout: Duration,
}

impl VersionOracle {
    /// Oracle reading the manifest at `manifest_path`.
    pub fn new(manifest_path: impl Into<PathBuf>, query_timeout: Duration) -> Self {
        Self {
            manifest_path: manifest_path.into(),
            query_timeout,
        }
    }

    /// Manifest location for `app_id` under `install_dir`.
    #[must_use]
    pub fn manifest_path_for(install_dir: &Path, app_id: &str) -> PathBuf {
        install_dir.join("steamapps").join(format!("appmanifest_{app_id}.acf"))
    }

    /// The manifest this oracle reads.
    #[must_use]
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    /// Installed build id, or `"0"` when it cannot be determined.
    pub async fn get_local_version(&self) -> BuildVersion {
        get_local_version(&self.manifest_path).await
    }

    /// Build id of the public branch, or [`RemoteVersion::Unknown`].
    pub async fn get_remote_version<R: SteamCmdRunner>(&self, runner: &R) -> RemoteVersion {
        debug!(target: "steamcmd", "Querying remote build id");

        let output = match runner.query_app_info(self.query_timeout).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Remote version query failed: {e:#}");
                return RemoteVersion::Unknown;
            }
        };

        if !output.success() {
            warn!(
                "Remote version query exited with code {}",
                output.exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string())
            );
            return RemoteVersion::Unknown;
        }

        match parse_public_build_id(&output.combined()) {
            Some(version) => {
                debug!("Remote build id: {version}");
                RemoteVersion::Known(version)
            }
            None => {
                warn!("Could not find the public branch build id in SteamCMD output");
                RemoteVersion::Unknown
            }
        }
    }
}

/// Read the installed build id from a manifest file.
///
/// Never fails: a missing file, unreadable file or file without a build id
/// all yield [`BuildVersion::not_installed`].
pub async fn get_local_version(manifest_path: &Path) -> BuildVersion {
    let content = match tokio::fs::read(manifest_path).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No app manifest at {}", manifest_path.display());
            return BuildVersion::not_installed();
        }
        Err(e) => {
            warn!("Failed to read app manifest {}: {e}", manifest_path.display());
            return BuildVersion::not_installed();
        }
    };

    parse_manifest_build_id(&content).unwrap_or_else(|| {
        warn!("App manifest {} has no build id", manifest_path.display());
        BuildVersion::not_installed()
    })
}
