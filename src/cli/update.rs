//! The update command: install or update the dedicated server.
//!
//! Exactly one JSON document is written to stdout per invocation, whether the
//! run succeeds or fails. Everything else (logs, SteamCMD output, the
//! human-readable error block) goes to stderr.
//!
//! # Examples
//!
//! ```bash
//! # Install or update with defaults
//! dst-updater
//!
//! # Machine-readable output for a panel or script
//! dst-updater --json --install-dir /srv/dst --steamcmd-dir /srv/steamcmd
//!
//! # Only report whether an update is available
//! dst-updater --check-only --json
//!
//! # Revalidate everything through a proxy
//! dst-updater --force --proxy http://10.0.0.1:3128
//! ```

use clap::{Args, ValueEnum};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::{ConfigOverrides, UpdaterConfig};
use crate::core::{classify, user_friendly_error};
use crate::orchestrator::{UpdateOrchestrator, UpdateOutcome};
use crate::steamcmd::{EnvOverrides, SteamCmd};
use crate::utils::{ConsoleProgress, Fs4DiskProbe, NoProgress, ProgressReporter};

/// How the result document is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Indented JSON plus streamed SteamCMD output
    Text,
    /// Compact single-line JSON only
    Json,
}

/// Arguments for an update run.
#[derive(Args, Debug, Clone, Default)]
pub struct UpdateArgs {
    /// Server install directory [default: /home/container/games/dst]
    #[arg(long, env = "DST_UPDATER_INSTALL_DIR", value_name = "DIR")]
    pub install_dir: Option<String>,

    /// SteamCMD directory [default: /home/container/games/steamcmd]
    #[arg(long, env = "DST_UPDATER_STEAMCMD_DIR", value_name = "DIR")]
    pub steamcmd_dir: Option<String>,

    /// Proxy for SteamCMD and the SteamCMD download, e.g. http://ip:port
    #[arg(long, env = "DST_UPDATER_PROXY", value_name = "URL")]
    pub proxy: Option<String>,

    /// Where to download SteamCMD from when it is missing
    #[arg(long, env = "DST_UPDATER_STEAMCMD_URL", value_name = "URL")]
    pub steamcmd_url: Option<String>,

    /// Emit compact JSON and nothing else on stdout
    #[arg(long, env = "DST_UPDATER_JSON")]
    pub json: bool,

    /// Update and validate even when the installed build is current
    #[arg(long, env = "DST_UPDATER_FORCE")]
    pub force: bool,

    /// Report whether an update is available without installing it
    #[arg(long, env = "DST_UPDATER_CHECK_ONLY", conflicts_with = "force")]
    pub check_only: bool,

    /// Update attempts before giving up [default: 5]
    #[arg(long, env = "DST_UPDATER_MAX_RETRIES", value_name = "N")]
    pub max_retries: Option<u32>,

    /// Seconds to wait between failed attempts [default: 10]
    #[arg(long, env = "DST_UPDATER_RETRY_DELAY_SECS", value_name = "SECS")]
    pub retry_delay_secs: Option<u64>,
}

impl UpdateArgs {
    /// Selected output format.
    #[must_use]
    pub const fn format(&self) -> OutputFormat {
        if self.json { OutputFormat::Json } else { OutputFormat::Text }
    }

    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            install_dir: self.install_dir.clone(),
            steamcmd_dir: self.steamcmd_dir.clone(),
            proxy: self.proxy.clone(),
            steamcmd_url: self.steamcmd_url.clone(),
            max_retries: self.max_retries,
            retry_delay_secs: self.retry_delay_secs,
            force: self.force,
            check_only: self.check_only,
        }
    }

    /// Resolve configuration and run the update, returning its outcome.
    ///
    /// Never fails: configuration problems become an error outcome too.
    pub async fn execute(
        &self,
        config_path: Option<&Path>,
        show_progress: bool,
        cancel: &CancellationToken,
    ) -> UpdateOutcome {
        let config = match UpdaterConfig::load(config_path, self.overrides()).await {
            Ok(config) => config,
            Err(e) => {
                let (class, message) = classify(&e);
                return UpdateOutcome::error(class, message);
            }
        };
        debug!(?config, "Resolved configuration");

        if show_progress {
            run(config, cancel, &mut ConsoleProgress::new()).await
        } else {
            run(config, cancel, &mut NoProgress).await
        }
    }

    /// Print the outcome: JSON on stdout, and in text mode an error block on
    /// stderr for failures.
    pub fn report(&self, outcome: &UpdateOutcome) {
        let format = self.format();
        if let (OutputFormat::Text, UpdateOutcome::Error(failure)) = (format, outcome) {
            user_friendly_error(failure.error.code, &failure.error.message).display();
        }

        match outcome.to_json(format == OutputFormat::Json) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Failed to serialize result: {e}"),
        }
    }
}

async fn run<P: ProgressReporter>(
    config: UpdaterConfig,
    cancel: &CancellationToken,
    progress: &mut P,
) -> UpdateOutcome {
    let runner = SteamCmd::new(
        config.steamcmd_dir.join(crate::constants::STEAMCMD_EXECUTABLE),
        &config.install_dir,
        config.app_id.clone(),
    )
    .with_env(EnvOverrides::for_proxy(config.proxy.as_deref()));

    UpdateOrchestrator::new(config, runner, Fs4DiskProbe).execute(cancel, progress).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ErrorClass;
    use tempfile::TempDir;

    #[test]
    fn test_format_selection() {
        let args = UpdateArgs::default();
        assert_eq!(args.format(), OutputFormat::Text);

        let args = UpdateArgs {
            json: true,
            ..UpdateArgs::default()
        };
        assert_eq!(args.format(), OutputFormat::Json);
    }

    #[test]
    fn test_overrides_carry_flags() {
        let args = UpdateArgs {
            install_dir: Some("/srv/dst".to_string()),
            proxy: Some("http://p:1".to_string()),
            force: true,
            max_retries: Some(2),
            ..UpdateArgs::default()
        };
        let overrides = args.overrides();
        assert_eq!(overrides.install_dir.as_deref(), Some("/srv/dst"));
        assert_eq!(overrides.proxy.as_deref(), Some("http://p:1"));
        assert_eq!(overrides.max_retries, Some(2));
        assert!(overrides.force);
        assert!(!overrides.check_only);
    }

    #[tokio::test]
    async fn test_bad_config_file_becomes_error_outcome() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        std::fs::write(&config, "max_retries = \"many\"\n").unwrap();

        let outcome = UpdateArgs::default()
            .execute(Some(&config), false, &CancellationToken::new())
            .await;
        match outcome {
            UpdateOutcome::Error(failure) => {
                assert_eq!(failure.error.code, ErrorClass::Unknown);
                assert!(failure.error.message.contains("Failed to parse config"));
            }
            UpdateOutcome::Success(_) => panic!("expected an error outcome"),
        }
    }
}
