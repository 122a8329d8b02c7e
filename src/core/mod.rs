//! Core types for dst-updater
//!
//! This module holds the error taxonomy shared by every stage of an update
//! run. Failures are raised as [`UpdaterError`], carried as [`anyhow::Error`]
//! through I/O glue, and reduced to an [`ErrorClass`] plus message by
//! [`classify`] at the single point where the run's outcome is assembled.
//!
//! # Examples
//!
//! ```rust
//! use dst_updater::core::{classify, user_friendly_error, ErrorClass, UpdaterError};
//! use anyhow::Result;
//!
//! fn attempt() -> Result<()> {
//!     Err(UpdaterError::ToolFailed { exit_code: Some(1) }.into())
//! }
//!
//! if let Err(e) = attempt() {
//!     let (class, message) = classify(&e);
//!     assert_eq!(class, ErrorClass::ExternalToolFailure);
//!     user_friendly_error(class, &message).display();
//! }
//! ```

pub mod error;

pub use error::{
    classify, error_chain_message, user_friendly_error, ErrorClass, ErrorContext, UpdaterError,
};
