//! # Design
//!
//! - A returned [`SinkError`] stops the run; batch-scoped failures travel in
//!   [`crate::FailedBatch`] instead.
//! - Messages are constant; operations, paths, and hosts travel as context.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Errors raised by sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing JSON output failed.
    #[error("sink io failure")]
    Io {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Output file, or `None` for stdout.
        path: Option<PathBuf>,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A record could not be serialised.
    #[error("failed to serialize record")]
    Serialize {
        /// Underlying serde error.
        source: serde_json::Error,
    },
    /// The destination database could not be reached.
    #[error("failed to connect to destination database")]
    Connect {
        /// Destination host.
        host: String,
        /// Destination port.
        port: u16,
        /// Underlying driver error.
        source: sqlx::Error,
    },
    /// A statement or transaction failed.
    #[error("destination database operation failed")]
    Database {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Underlying driver error.
        source: sqlx::Error,
    },
}

impl SinkError {
    /// Whether the error means the destination itself is gone rather than
    /// one batch being unacceptable.
    #[must_use]
    pub const fn is_connection_loss(&self) -> bool {
        match self {
            Self::Connect { .. } => true,
            Self::Database { source, .. } => matches!(
                source,
                sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            Self::Io { .. } | Self::Serialize { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn connection_loss_is_distinguished_from_statement_failures() {
        let lost = SinkError::Database {
            operation: "commit batch",
            source: sqlx::Error::PoolClosed,
        };
        assert!(lost.is_connection_loss());
        assert_eq!(lost.to_string(), "destination database operation failed");

        let rejected = SinkError::Database {
            operation: "insert torrents",
            source: sqlx::Error::RowNotFound,
        };
        assert!(!rejected.is_connection_loss());
        assert!(rejected.source().is_some());
    }
}
