//! Command-line interface for dst-updater.
//!
//! The tool has a single job, so there are no subcommands: the flags of
//! [`update::UpdateArgs`] are flattened into [`Cli`] next to the global
//! logging and configuration options.
//!
//! # Output Channels
//!
//! - **stdout**: exactly one JSON result document
//! - **stderr**: tracing output, streamed SteamCMD lines and, in text mode,
//!   a coloured error block
//!
//! # Log Level
//!
//! `RUST_LOG` wins when set. Otherwise `--verbose` selects `debug`, `--quiet`
//! selects `error`, `--json` selects `warn` and the default is `info`.

pub mod update;

use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::orchestrator::UpdateOutcome;
pub use update::{OutputFormat, UpdateArgs};

/// Runtime settings derived from the global flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliConfig {
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Whether to show the spinner and stream SteamCMD output
    pub show_progress: bool,
    /// Explicit configuration file
    pub config_path: Option<PathBuf>,
}

/// Install and update the Don't Starve Together dedicated server via SteamCMD.
#[derive(Parser, Debug)]
#[command(
    name = "dst-updater",
    about = "Install and update the Don't Starve Together dedicated server",
    version,
    long_about = "Installs SteamCMD if needed, compares the installed build with the public \
                  branch and runs a validated update with retries. Prints one JSON result."
)]
pub struct Cli {
    #[command(flatten)]
    update: UpdateArgs,

    /// Enable debug logging, including every SteamCMD line
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors and hide SteamCMD output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to a TOML configuration file [default: ~/.dst-updater/config.toml]
    #[arg(long, global = true, env = "DST_UPDATER_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Build a [`CliConfig`] from the parsed flags.
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else if self.update.json {
            "warn"
        } else {
            "info"
        };

        CliConfig {
            log_level: log_level.to_string(),
            show_progress: !self.quiet && !self.update.json,
            config_path: self.config.clone(),
        }
    }

    /// Run the update and print its result. Returns the process exit code.
    pub async fn execute(self) -> i32 {
        let config = self.build_config();
        init_logging(&config.log_level, self.update.format() == OutputFormat::Text);

        let cancel = CancellationToken::new();
        spawn_ctrl_c_handler(cancel.clone());

        let outcome = self.execute_with_config(&config, &cancel).await;
        self.update.report(&outcome);
        outcome.exit_code()
    }

    /// Run the update with explicit settings, without printing.
    pub async fn execute_with_config(
        &self,
        config: &CliConfig,
        cancel: &CancellationToken,
    ) -> UpdateOutcome {
        self.update.execute(config.config_path.as_deref(), config.show_progress, cancel).await
    }
}

/// Install the stderr tracing subscriber.
///
/// Does nothing if a global subscriber is already set.
pub fn init_logging(default_level: &str, ansi: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(ansi)
        .try_init();
}

fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping SteamCMD");
            cancel.cancel();
        }
    });
}
