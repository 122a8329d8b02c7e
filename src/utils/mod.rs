//! Filesystem, disk and console helpers
//!
//! # Modules
//!
//! - [`fs`] - Directory creation with permission classification
//! - [`disk`] - Free-space probing behind the [`DiskProbe`] trait
//! - [`progress`] - SteamCMD progress reporting for human and JSON modes

pub mod disk;
pub mod fs;
pub mod progress;

pub use disk::{DiskInfo, DiskProbe, Fs4DiskProbe, ProbeError};
pub use fs::{ensure_dir, file_exists, make_executable};
pub use progress::{ConsoleProgress, NoProgress, ProgressReporter};
