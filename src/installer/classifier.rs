//! Classification of individual SteamCMD output lines.
//!
//! SteamCMD's log text is the only signal about an update's progress and
//! result. All matching against that text lives here so the brittle parts are
//! in one place:
//!
//! - `Update state (0x61) downloading, progress: 12.34 (1234 / 5678)`: the
//!   last number is the total download size in bytes. Only lines containing
//!   `downloading` are considered.
//! - `Success! App '343050' fully installed.` marks a completed install.
//! - `0x202` (rate limit / network) and `0x6` (disk write) are error codes,
//!   matched as plain substrings with network taking precedence. Progress
//!   lines carry a state code such as `(0x61)`, so they are never read as a
//!   disk error.

use regex::Regex;
use std::sync::LazyLock;

use crate::constants::{DISK_ERROR_MARKER, NETWORK_ERROR_MARKER, success_marker};

static PROGRESS_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"progress:\s+\d+\.\d+\s+\(\d+\s+/\s+(\d+)\)"));

/// An error code SteamCMD printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMarker {
    /// `0x202`: rate limited or connection lost
    Network,
    /// `0x6`: content could not be written
    Disk,
}

impl FailureMarker {
    /// The literal code as printed by SteamCMD.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Network => NETWORK_ERROR_MARKER,
            Self::Disk => DISK_ERROR_MARKER,
        }
    }
}

/// What a single line says about the attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineSignal {
    /// Total download size reported by a progress line
    pub progress_bytes: Option<u64>,
    /// The line carries the success marker
    pub success: bool,
    /// The line carries an error code
    pub error_marker: Option<FailureMarker>,
}

/// Classify one line of SteamCMD output for `app_id`.
///
/// Lines that match nothing, including malformed progress lines and totals
/// that overflow `u64`, produce an empty signal.
#[must_use]
pub fn classify_line(line: &str, app_id: &str) -> LineSignal {
    LineSignal {
        progress_bytes: progress_total(line),
        success: line.contains(&success_marker(app_id)),
        error_marker: error_marker(line, is_progress_line(line)),
    }
}

fn is_progress_line(line: &str) -> bool {
    PROGRESS_RE.as_ref().is_ok_and(|re| re.is_match(line))
}

fn progress_total(line: &str) -> Option<u64> {
    if !line.contains("downloading") {
        return None;
    }
    let re = PROGRESS_RE.as_ref().ok()?;
    re.captures(line)?.get(1)?.as_str().parse().ok()
}

fn error_marker(line: &str, is_progress: bool) -> Option<FailureMarker> {
    if line.contains(FailureMarker::Network.code()) {
        Some(FailureMarker::Network)
    } else if !is_progress && line.contains(FailureMarker::Disk.code()) {
        Some(FailureMarker::Disk)
    } else {
        None
    }
}
