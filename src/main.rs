//! dst-updater CLI entry point
//!
//! Parses arguments, runs the update and exits with 0 on success or 1 on any
//! error outcome. The result document is printed by the CLI layer.

use clap::Parser;
use dst_updater::cli;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let code = cli.execute().await;
    std::process::exit(code);
}
