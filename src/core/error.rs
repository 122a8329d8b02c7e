//! Error handling for dst-updater
//!
//! This module provides the error taxonomy consumed by scripts that parse the
//! updater's JSON output, and the user-friendly error reporting used in
//! human-readable mode. The error system is designed around two principles:
//! 1. **A closed classification** ([`ErrorClass`]) whose codes are a stable
//!    contract for programmatic consumers
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!
//! # Architecture
//!
//! - [`UpdaterError`] - Enumerated failures raised anywhere in an update run
//! - [`ErrorClass`] - The six stable codes every failure maps onto
//! - [`ErrorContext`] - Wrapper that adds suggestions and details for display
//!
//! Errors travel through the crate as [`anyhow::Error`]. At the top of a run
//! [`classify`] recovers the class and message exactly once, whatever the
//! concrete error type turned out to be.
//!
//! # Examples
//!
//! ```rust,no_run
//! use dst_updater::core::{classify, ErrorClass, UpdaterError};
//!
//! let error = anyhow::Error::from(UpdaterError::DiskWriteFailed {
//!     marker: "0x6".to_string(),
//! });
//! let (class, message) = classify(&error);
//! assert_eq!(class, ErrorClass::Disk);
//! assert_eq!(message, "Disk Write Fail (0x6)");
//! ```

use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable classification attached to every failure.
///
/// The serialized codes are what external tooling matches on, so they never
/// change even if the Rust variant names do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Anything that could not be attributed more precisely
    #[serde(rename = "ERR_UNKNOWN")]
    Unknown,
    /// A required external component is missing or broken
    #[serde(rename = "ERR_DEPENDENCY")]
    Dependency,
    /// Download failures, rate limiting and dropped connections
    #[serde(rename = "ERR_NETWORK")]
    Network,
    /// Not enough free space, or content could not be written
    #[serde(rename = "ERR_DISK")]
    Disk,
    /// A directory could not be created or written
    #[serde(rename = "ERR_PERMISSION")]
    Permission,
    /// SteamCMD ran but did not report a completed install
    #[serde(rename = "ERR_STEAMCMD")]
    ExternalToolFailure,
}

impl ErrorClass {
    /// The stable wire code for this class.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Unknown => "ERR_UNKNOWN",
            Self::Dependency => "ERR_DEPENDENCY",
            Self::Network => "ERR_NETWORK",
            Self::Disk => "ERR_DISK",
            Self::Permission => "ERR_PERMISSION",
            Self::ExternalToolFailure => "ERR_STEAMCMD",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// The main error type for update runs
///
/// Each variant maps onto exactly one [`ErrorClass`] through
/// [`UpdaterError::class`]. The `Display` text is the message reported next to
/// the class code, so it is written for the operator reading the JSON output.
///
/// # Error Categories
///
/// ## Filesystem
/// - [`PermissionDenied`] - Directory could not be created
/// - [`InsufficientDiskSpace`] - Free space below the configured floor
///
/// ## SteamCMD bootstrap
/// - [`ToolInstallFailed`] - Archive download or unpack failed
/// - [`ToolMissing`] - Archive unpacked but the launcher is absent
///
/// ## Update attempts
/// - [`NetworkFailure`] - SteamCMD reported a rate-limit or network code
/// - [`DiskWriteFailed`] - SteamCMD reported a disk write code
/// - [`ToolFailed`] - SteamCMD exited without the success marker
/// - [`LaunchFailed`] - SteamCMD could not be started or its output read
/// - [`ServerBinaryMissing`] - Success was reported but the binary is absent
///
/// ## Coordination
/// - [`InstallLocked`] - Another process holds the install directory lock
/// - [`Cancelled`] - The run was interrupted
///
/// [`PermissionDenied`]: UpdaterError::PermissionDenied
/// [`InsufficientDiskSpace`]: UpdaterError::InsufficientDiskSpace
/// [`ToolInstallFailed`]: UpdaterError::ToolInstallFailed
/// [`ToolMissing`]: UpdaterError::ToolMissing
/// [`NetworkFailure`]: UpdaterError::NetworkFailure
/// [`DiskWriteFailed`]: UpdaterError::DiskWriteFailed
/// [`ToolFailed`]: UpdaterError::ToolFailed
/// [`LaunchFailed`]: UpdaterError::LaunchFailed
/// [`ServerBinaryMissing`]: UpdaterError::ServerBinaryMissing
/// [`InstallLocked`]: UpdaterError::InstallLocked
/// [`Cancelled`]: UpdaterError::Cancelled
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdaterError {
    /// A directory needed by the run could not be created or written
    #[error("No write permission: {path}")]
    PermissionDenied {
        /// The directory that could not be created
        path: String,
    },

    /// Free space under the install directory is below the floor
    #[error("Insufficient disk space. Free: {free_mb}MB, required: {required_mb}MB")]
    InsufficientDiskSpace {
        /// Free space observed, in MiB
        free_mb: u64,
        /// Configured minimum, in MiB
        required_mb: u64,
    },

    /// Downloading or unpacking the SteamCMD archive failed
    #[error("Failed to install SteamCMD: {reason}")]
    ToolInstallFailed {
        /// Underlying cause, including the error chain
        reason: String,
    },

    /// The SteamCMD archive unpacked without the launcher script
    #[error("SteamCMD launcher not found after install: {path}")]
    ToolMissing {
        /// Expected launcher location
        path: String,
    },

    /// SteamCMD printed its rate-limit / network error code
    #[error("Rate Limit/Network ({marker})")]
    NetworkFailure {
        /// The marker found in the output
        marker: String,
    },

    /// SteamCMD printed its disk write error code
    #[error("Disk Write Fail ({marker})")]
    DiskWriteFailed {
        /// The marker found in the output
        marker: String,
    },

    /// SteamCMD finished without exit code 0 and the success marker
    #[error("SteamCMD failed (Code {})", exit_code_label(.exit_code))]
    ToolFailed {
        /// Process exit code, `None` when terminated by a signal
        exit_code: Option<i32>,
    },

    /// SteamCMD could not be spawned, or its output could not be read
    #[error("Failed to launch SteamCMD: {reason}")]
    LaunchFailed {
        /// Underlying I/O error text
        reason: String,
    },

    /// SteamCMD reported success but the server binary is not on disk
    #[error("Install reported success but the server binary is missing: {path}")]
    ServerBinaryMissing {
        /// Expected binary location
        path: String,
    },

    /// Another updater holds the install directory lock
    #[error("Install directory is locked by another process: {path}")]
    InstallLocked {
        /// The locked install directory
        path: String,
    },

    /// The run was interrupted before it completed
    #[error("Operation cancelled")]
    Cancelled,

    /// Any other failure
    #[error("{message}")]
    Other {
        /// Human-readable description
        message: String,
    },
}

impl UpdaterError {
    /// The stable class reported for this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::PermissionDenied { .. } => ErrorClass::Permission,
            Self::InsufficientDiskSpace { .. } | Self::DiskWriteFailed { .. } => ErrorClass::Disk,
            Self::ToolInstallFailed { .. } | Self::NetworkFailure { .. } => ErrorClass::Network,
            Self::ToolMissing { .. } => ErrorClass::Dependency,
            Self::ToolFailed { .. } | Self::ServerBinaryMissing { .. } => {
                ErrorClass::ExternalToolFailure
            }
            Self::LaunchFailed { .. }
            | Self::InstallLocked { .. }
            | Self::Cancelled
            | Self::Other { .. } => ErrorClass::Unknown,
        }
    }
}

fn exit_code_label(exit_code: &Option<i32>) -> String {
    exit_code.map_or_else(|| "signal".to_string(), |code| code.to_string())
}

/// Recover the class and message for any error raised during a run.
///
/// [`UpdaterError`]s anywhere in the chain keep their own class. Bare I/O
/// errors are classified by kind. Everything else is [`ErrorClass::Unknown`]
/// with the full cause chain as the message.
#[must_use]
pub fn classify(error: &anyhow::Error) -> (ErrorClass, String) {
    if let Some(updater_error) = error.chain().find_map(|e| e.downcast_ref::<UpdaterError>()) {
        return (updater_error.class(), updater_error.to_string());
    }

    if let Some(io_error) = error.chain().find_map(|e| e.downcast_ref::<std::io::Error>()) {
        let class = match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => ErrorClass::Permission,
            std::io::ErrorKind::StorageFull => ErrorClass::Disk,
            _ => ErrorClass::Unknown,
        };
        if class != ErrorClass::Unknown {
            return (class, error_chain_message(error));
        }
    }

    (ErrorClass::Unknown, error_chain_message(error))
}

/// Flatten an error and its causes into a single line.
#[must_use]
pub fn error_chain_message(error: &anyhow::Error) -> String {
    error.chain().map(ToString::to_string).collect::<Vec<_>>().join(": ")
}

/// User-friendly error wrapper with suggestions for human-readable mode
#[derive(Debug)]
pub struct ErrorContext {
    /// Classification of the underlying failure
    pub class: ErrorClass,
    /// Message reported for the failure
    pub message: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Display the error context to stderr with terminal colors
    ///
    /// - Error message: Red and bold
    /// - Details: Yellow
    /// - Suggestion: Green
    pub fn display(&self) {
        eprintln!("{} [{}]: {}", "error".red().bold(), self.class, self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.class, self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert a classified failure into an [`ErrorContext`] with suggestions
///
/// Suggestions are chosen per class; the message is kept verbatim so the
/// human-readable block and the JSON output always agree.
#[must_use]
pub fn user_friendly_error(class: ErrorClass, message: &str) -> ErrorContext {
    let ctx = ErrorContext::new(class, message);
    match class {
        ErrorClass::Permission => ctx
            .with_suggestion("Check ownership of the install and SteamCMD directories, or pass --install-dir / --steamcmd-dir pointing at writable locations")
            .with_details("The updater must be able to create and write both directories"),
        ErrorClass::Disk => ctx
            .with_suggestion("Free up space on the volume holding the install directory and run the update again")
            .with_details("SteamCMD needs room for the downloaded content plus a staging copy while validating"),
        ErrorClass::Network => ctx
            .with_suggestion("Check connectivity to Steam, wait a few minutes if you are being rate limited, or configure --proxy")
            .with_details("Steam's content network throttles clients that download aggressively"),
        ErrorClass::Dependency => ctx
            .with_suggestion("Delete the SteamCMD directory and let the updater bootstrap it again, or point --steamcmd-url at a valid archive")
            .with_details("SteamCMD on Linux also needs the 32-bit C runtime (lib32gcc-s1 on Debian/Ubuntu)"),
        ErrorClass::ExternalToolFailure => ctx
            .with_suggestion("Re-run with --verbose to see the full SteamCMD log, or retry with --force to revalidate every file")
            .with_details("SteamCMD exited without reporting a completed install"),
        ErrorClass::Unknown => ctx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_error_display() {
        let error = UpdaterError::ToolFailed {
            exit_code: Some(8),
        };
        assert_eq!(error.to_string(), "SteamCMD failed (Code 8)");

        let error = UpdaterError::ToolFailed {
            exit_code: None,
        };
        assert_eq!(error.to_string(), "SteamCMD failed (Code signal)");

        let error = UpdaterError::NetworkFailure {
            marker: "0x202".to_string(),
        };
        assert_eq!(error.to_string(), "Rate Limit/Network (0x202)");
    }

    #[test]
    fn test_every_variant_has_expected_class() {
        let cases = vec![
            (
                UpdaterError::PermissionDenied {
                    path: "/srv".to_string(),
                },
                ErrorClass::Permission,
            ),
            (
                UpdaterError::InsufficientDiskSpace {
                    free_mb: 10,
                    required_mb: 2048,
                },
                ErrorClass::Disk,
            ),
            (
                UpdaterError::DiskWriteFailed {
                    marker: "0x6".to_string(),
                },
                ErrorClass::Disk,
            ),
            (
                UpdaterError::ToolInstallFailed {
                    reason: "dns".to_string(),
                },
                ErrorClass::Network,
            ),
            (
                UpdaterError::ToolMissing {
                    path: "steamcmd.sh".to_string(),
                },
                ErrorClass::Dependency,
            ),
            (
                UpdaterError::ToolFailed {
                    exit_code: Some(1),
                },
                ErrorClass::ExternalToolFailure,
            ),
            (
                UpdaterError::ServerBinaryMissing {
                    path: "bin".to_string(),
                },
                ErrorClass::ExternalToolFailure,
            ),
            (
                UpdaterError::LaunchFailed {
                    reason: "ENOENT".to_string(),
                },
                ErrorClass::Unknown,
            ),
            (UpdaterError::Cancelled, ErrorClass::Unknown),
        ];

        for (error, expected) in cases {
            assert_eq!(error.class(), expected, "wrong class for {error}");
        }
    }

    #[test]
    fn test_class_codes_serialize_as_stable_strings() {
        let json = serde_json::to_string(&ErrorClass::ExternalToolFailure).unwrap();
        assert_eq!(json, "\"ERR_STEAMCMD\"");
        assert_eq!(ErrorClass::Disk.to_string(), "ERR_DISK");

        let parsed: ErrorClass = serde_json::from_str("\"ERR_NETWORK\"").unwrap();
        assert_eq!(parsed, ErrorClass::Network);
    }

    #[test]
    fn test_classify_finds_updater_error_behind_context() {
        let error = anyhow::Error::from(UpdaterError::DiskWriteFailed {
            marker: "0x6".to_string(),
        })
        .context("attempt 3 failed");

        let (class, message) = classify(&error);
        assert_eq!(class, ErrorClass::Disk);
        assert_eq!(message, "Disk Write Fail (0x6)");
    }

    #[test]
    fn test_classify_io_permission_denied() {
        let result: anyhow::Result<()> =
            Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"))
                .context("Failed to write manifest");

        let (class, message) = classify(&result.unwrap_err());
        assert_eq!(class, ErrorClass::Permission);
        assert!(message.contains("Failed to write manifest"));
        assert!(message.contains("denied"));
    }

    #[test]
    fn test_classify_generic_error_is_unknown() {
        let (class, message) = classify(&anyhow::anyhow!("something odd"));
        assert_eq!(class, ErrorClass::Unknown);
        assert_eq!(message, "something odd");
    }

    #[test]
    fn test_user_friendly_error_adds_suggestions() {
        let ctx = user_friendly_error(ErrorClass::Disk, "Disk Write Fail (0x6)");
        assert!(ctx.suggestion.is_some());
        assert!(ctx.details.is_some());

        let display = format!("{ctx}");
        assert!(display.contains("[ERR_DISK] Disk Write Fail (0x6)"));
        assert!(display.contains("Suggestion:"));
    }

    #[test]
    fn test_user_friendly_error_unknown_has_no_suggestion() {
        let ctx = user_friendly_error(ErrorClass::Unknown, "boom");
        assert!(ctx.suggestion.is_none());
        assert_eq!(format!("{ctx}"), "[ERR_UNKNOWN] boom");
    }
}
