//! # Design
//!
//! - Every variant is fatal for the run; per-record problems never reach here.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Exit codes distinguish configuration mistakes from runtime failures.
//! - Failures after the run started carry the counts reached so far.

use magbridge_config::ConfigError;
use magbridge_sinks::SinkError;
use magbridge_sources::SourceError;
use magbridge_telemetry::TelemetryError;
use thiserror::Error;

use crate::summary::RunSummary;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// The run configuration was missing values or invalid.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: ConfigError,
    },
    /// The source could not be opened or stopped producing.
    #[error("source operation failed")]
    Source {
        /// Operation identifier.
        operation: &'static str,
        /// Source reader error.
        source: SourceError,
    },
    /// The destination became unusable.
    #[error("sink operation failed")]
    Sink {
        /// Operation identifier.
        operation: &'static str,
        /// Source sink error.
        source: SinkError,
    },
    /// Logging could not be initialised.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: TelemetryError,
    },
    /// A fatal failure after records had started flowing.
    #[error("ingest aborted")]
    Aborted {
        /// Counts at the point of failure, after the sink was finished.
        summary: RunSummary,
        /// The failure that ended the run.
        source: Box<AppError>,
    },
}

impl AppError {
    pub(crate) const fn config(operation: &'static str, source: ConfigError) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn reader(operation: &'static str, source: SourceError) -> Self {
        Self::Source { operation, source }
    }

    pub(crate) const fn sink(operation: &'static str, source: SinkError) -> Self {
        Self::Sink { operation, source }
    }

    pub(crate) const fn telemetry(operation: &'static str, source: TelemetryError) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) fn aborted(summary: RunSummary, source: Self) -> Self {
        Self::Aborted {
            summary,
            source: Box::new(source),
        }
    }

    /// Process exit status for this failure: `2` for configuration, `3` otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 2,
            Self::Aborted { source, .. } => source.exit_code(),
            Self::Source { .. } | Self::Sink { .. } | Self::Telemetry { .. } => 3,
        }
    }

    /// Counts of a run that failed after it started.
    #[must_use]
    pub const fn summary(&self) -> Option<&RunSummary> {
        match self {
            Self::Aborted { summary, .. } => Some(summary),
            Self::Config { .. }
            | Self::Source { .. }
            | Self::Sink { .. }
            | Self::Telemetry { .. } => None,
        }
    }

    /// Message with the full cause chain, for the operator.
    #[must_use]
    pub fn display_message(&self) -> String {
        let mut message = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            message.push_str(": ");
            message.push_str(&err.to_string());
            cause = err.source();
        }
        match self {
            Self::Config { source, .. } => match source.field() {
                Some(field) => format!("{message} (field `{field}`)"),
                None => message,
            },
            Self::Source { .. }
            | Self::Sink { .. }
            | Self::Telemetry { .. }
            | Self::Aborted { .. } => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn exit_codes_separate_configuration_from_runtime_failures() {
        let config = AppError::config(
            "config.validate",
            ConfigError::MissingField {
                field: "negative_size",
            },
        );
        assert_eq!(config.exit_code(), 2);
        assert_eq!(
            config.display_message(),
            "configuration operation failed: missing configuration value (field `negative_size`)"
        );

        let source = AppError::reader(
            "source.open",
            SourceError::Unavailable {
                path: PathBuf::from("/nope"),
                reason: "directory does not exist",
            },
        );
        assert_eq!(source.exit_code(), 3);
        assert_eq!(
            source.display_message(),
            "source operation failed: source unavailable"
        );
        assert!(source.summary().is_none());

        let counts = RunSummary {
            seen: 4,
            sunk: 3,
            ..RunSummary::default()
        };
        let aborted = AppError::aborted(counts, source);
        assert_eq!(aborted.exit_code(), 3);
        assert_eq!(aborted.summary(), Some(&counts));
        assert_eq!(
            aborted.display_message(),
            "ingest aborted: source operation failed: source unavailable"
        );
    }
}
