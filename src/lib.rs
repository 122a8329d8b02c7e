//! dst-updater - SteamCMD-driven installer for the Don't Starve Together
//! dedicated server
//!
//! The updater drives SteamCMD as an opaque subprocess. It installs SteamCMD
//! if needed, compares the installed build with the public branch, runs a
//! validated `app_update` with bounded retries when they differ, and reports
//! one machine-readable result.
//!
//! # Architecture Overview
//!
//! Leaf first:
//!
//! - [`steamcmd`] - Command builder, the [`steamcmd::SteamCmdRunner`] seam,
//!   per-child proxy environment and the SteamCMD bootstrap
//! - [`version`] - Local manifest and remote app info build ids
//! - [`installer`] - Line classifier, retrying installer and install lock
//! - [`orchestrator`] - The update decision and the single run outcome
//! - [`cli`] - Argument parsing, logging setup and output
//!
//! Supporting modules:
//!
//! - [`core`] - Error taxonomy and user-facing error display
//! - [`config`] - Layered configuration (defaults, TOML file, env/flags)
//! - [`constants`] - SteamCMD vocabulary, log markers, retry parameters
//! - [`utils`] - Directory creation, disk probing and progress reporting
//!
//! # Result Document
//!
//! ```json
//! {"status":"success","state":"updated",
//!  "version_info":{"old_version":"100","new_version":"205","remote_version":"205"},
//!  "download_info":{"total_bytes":1048576,"total_mb":1.0,"note":"Size captured from SteamCMD log"},
//!  "paths":{"install_dir":"/home/container/games/dst","steamcmd_dir":"/home/container/games/steamcmd"},
//!  "timestamp":1717000000}
//! ```
//!
//! Failures produce `{"status":"error","error":{"code":"ERR_...","message":"..."}}`
//! and exit code 1.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use dst_updater::config::UpdaterConfig;
//! use dst_updater::orchestrator::UpdateOrchestrator;
//! use dst_updater::steamcmd::SteamCmd;
//! use dst_updater::utils::{Fs4DiskProbe, NoProgress};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = UpdaterConfig::default();
//! let runner = SteamCmd::new(
//!     config.steamcmd_dir.join("steamcmd.sh"),
//!     &config.install_dir,
//!     config.app_id.clone(),
//! );
//! let outcome = UpdateOrchestrator::new(config, runner, Fs4DiskProbe)
//!     .execute(&CancellationToken::new(), &mut NoProgress)
//!     .await;
//! println!("{}", outcome.to_json(true)?);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod installer;
pub mod orchestrator;
pub mod steamcmd;
pub mod utils;
pub mod version;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
