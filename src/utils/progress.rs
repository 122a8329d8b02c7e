//! Progress reporting for SteamCMD runs
//!
//! An update can take a long time and SteamCMD's own output is the only sign
//! of life, so human mode echoes every SteamCMD line (indented four spaces) to
//! stderr underneath a spinner that shows the current attempt and the largest
//! download total seen so far. JSON and quiet modes use [`NoProgress`], which
//! keeps stdout and stderr free of anything but the result and warnings.
//!
//! # Environment Variables
//!
//! - `DST_UPDATER_NO_PROGRESS`: Set to any value to hide the spinner. SteamCMD
//!   lines are still echoed.
//!
//! Every SteamCMD line is also emitted as a `debug` event on the `steamcmd`
//! tracing target regardless of the reporter in use.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::time::Duration;

fn is_progress_disabled() -> bool {
    std::env::var("DST_UPDATER_NO_PROGRESS").is_ok()
}

/// Receives events from the retrying installer.
///
/// All methods default to doing nothing.
pub trait ProgressReporter {
    /// An attempt is about to launch SteamCMD.
    fn attempt_started(&mut self, _attempt: u32, _max_attempts: u32) {}

    /// SteamCMD printed a line.
    fn line(&mut self, _line: &str) {}

    /// The largest download total seen so far grew.
    fn bytes_total(&mut self, _total_bytes: u64) {}

    /// An attempt failed and another one will follow.
    fn attempt_failed(&mut self, _attempt: u32, _message: &str) {}

    /// No more attempts will be made.
    fn finish(&mut self) {}
}

/// Reporter that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {}

/// Console reporter with an indicatif spinner on stderr.
pub struct ConsoleProgress {
    bar: IndicatifBar,
    attempt: u32,
    max_attempts: u32,
    total_bytes: u64,
}

impl ConsoleProgress {
    /// Creates a reporter. The spinner is hidden when
    /// `DST_UPDATER_NO_PROGRESS` is set or stderr is not a terminal.
    #[must_use]
    pub fn new() -> Self {
        let bar = if is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new_spinner();
            bar.set_style(spinner_style());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        };
        Self {
            bar,
            attempt: 0,
            max_attempts: 0,
            total_bytes: 0,
        }
    }

    fn refresh(&self) {
        let mb = self.total_bytes as f64 / (1024.0 * 1024.0);
        self.bar.set_message(format!(
            "SteamCMD attempt {}/{}, download size {mb:.2} MB",
            self.attempt, self.max_attempts
        ));
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for ConsoleProgress {
    fn attempt_started(&mut self, attempt: u32, max_attempts: u32) {
        self.attempt = attempt;
        self.max_attempts = max_attempts;
        self.refresh();
    }

    fn line(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        self.bar.suspend(|| eprintln!("    {line}"));
    }

    fn bytes_total(&mut self, total_bytes: u64) {
        self.total_bytes = total_bytes;
        self.refresh();
    }

    fn attempt_failed(&mut self, attempt: u32, message: &str) {
        self.bar.suspend(|| eprintln!("    attempt {attempt} failed: {message}"));
    }

    fn finish(&mut self) {
        self.bar.finish_and_clear();
    }
}

fn spinner_style() -> IndicatifStyle {
    IndicatifStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| IndicatifStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_progress_tracks_state() {
        let mut progress = ConsoleProgress {
            bar: IndicatifBar::hidden(),
            attempt: 0,
            max_attempts: 0,
            total_bytes: 0,
        };

        progress.attempt_started(2, 5);
        progress.bytes_total(3 * 1024 * 1024);
        assert_eq!(progress.attempt, 2);
        assert_eq!(progress.total_bytes, 3 * 1024 * 1024);
        assert_eq!(progress.bar.message(), "SteamCMD attempt 2/5, download size 3.00 MB");

        progress.finish();
        assert!(progress.bar.is_finished());
    }

    #[test]
    fn test_no_progress_accepts_all_events() {
        let mut progress = NoProgress;
        progress.attempt_started(1, 5);
        progress.line("Update state (0x61) downloading");
        progress.bytes_total(10);
        progress.attempt_failed(1, "SteamCMD failed (Code 8)");
        progress.finish();
    }
}
