//! # Design
//!
//! - Constant messages; the field name and offending value travel as context.
//! - Raised before any source is opened, so a bad configuration never starts a run.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while building a run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required value was not supplied.
    #[error("missing configuration value")]
    MissingField {
        /// Settings field that was absent.
        field: &'static str,
    },
    /// A value was supplied but is out of range or malformed.
    #[error("invalid configuration value")]
    InvalidField {
        /// Settings field that failed validation.
        field: &'static str,
        /// Offending value when available.
        value: Option<String>,
        /// Static reason for the failure.
        reason: &'static str,
    },
    /// Two settings cannot be combined.
    #[error("conflicting configuration values")]
    Conflict {
        /// Field that was rejected.
        field: &'static str,
        /// Field it conflicts with.
        other: &'static str,
    },
    /// A settings file could not be read.
    #[error("failed to read settings file")]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A settings file was not valid JSON for the settings shape.
    #[error("failed to parse settings file")]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying parse error.
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Name of the settings field involved, when there is one.
    #[must_use]
    pub const fn field(&self) -> Option<&'static str> {
        match self {
            Self::MissingField { field }
            | Self::InvalidField { field, .. }
            | Self::Conflict { field, .. } => Some(*field),
            Self::Io { .. } | Self::Parse { .. } => None,
        }
    }
}
