//! Shared fixtures for dst-updater integration tests

// Not every test binary uses every helper
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

use dst_updater::config::UpdaterConfig;
use dst_updater::orchestrator::{ErrorBody, SuccessOutcome, UpdateOutcome};
use dst_updater::utils::ProgressReporter;

/// A temporary server root with an install directory and a SteamCMD
/// directory that already holds a launcher, so no bootstrap download happens.
pub struct TestServer {
    temp: TempDir,
    pub install_dir: PathBuf,
    pub steamcmd_dir: PathBuf,
}

impl TestServer {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let install_dir = temp.path().join("dst");
        let steamcmd_dir = temp.path().join("steamcmd");
        std::fs::create_dir_all(&steamcmd_dir).unwrap();
        std::fs::write(steamcmd_dir.join("steamcmd.sh"), "#!/bin/sh\nexit 0\n").unwrap();

        Self {
            temp,
            install_dir,
            steamcmd_dir,
        }
    }

    /// Root directory of the fixture.
    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    /// Configuration pointing at this fixture, with no retry delay.
    pub fn config(&self) -> UpdaterConfig {
        UpdaterConfig {
            install_dir: self.install_dir.clone(),
            steamcmd_dir: self.steamcmd_dir.clone(),
            retry_delay: Duration::ZERO,
            lock_timeout: Duration::from_millis(200),
            query_timeout: Duration::from_secs(5),
            ..UpdaterConfig::default()
        }
    }

    /// Pretend build `build_id` is installed.
    pub fn install_build(&self, build_id: &str) {
        dst_updater::test_utils::write_manifest(&self.install_dir, build_id).unwrap();
        dst_updater::test_utils::write_server_binary(&self.install_dir).unwrap();
    }
}

/// Unwrap a success outcome.
pub fn expect_success(outcome: UpdateOutcome) -> SuccessOutcome {
    match outcome {
        UpdateOutcome::Success(success) => success,
        UpdateOutcome::Error(failure) => panic!(
            "expected success, got {}: {}",
            failure.error.code, failure.error.message
        ),
    }
}

/// Unwrap an error outcome.
pub fn expect_error(outcome: UpdateOutcome) -> ErrorBody {
    match outcome {
        UpdateOutcome::Error(failure) => failure.error,
        UpdateOutcome::Success(success) => {
            panic!("expected an error, got state {:?}", success.state)
        }
    }
}

/// Progress reporter that records what it is told.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    pub attempts: Vec<(u32, u32)>,
    pub lines: Vec<String>,
    pub byte_totals: Vec<u64>,
    pub failures: Vec<u32>,
    pub finished: bool,
}

impl ProgressReporter for RecordingProgress {
    fn attempt_started(&mut self, attempt: u32, max_attempts: u32) {
        self.attempts.push((attempt, max_attempts));
    }

    fn line(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    fn bytes_total(&mut self, total_bytes: u64) {
        self.byte_totals.push(total_bytes);
    }

    fn attempt_failed(&mut self, attempt: u32, _reason: &str) {
        self.failures.push(attempt);
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}
