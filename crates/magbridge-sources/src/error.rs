//! # Design
//!
//! - [`SourceError`] is fatal: the source is missing, unreadable, or fails its schema check.
//! - [`MalformedRecord`] is scoped to one file or row; readers yield it and keep going.
//! - Messages are constant; paths, row ids, and fields travel as context.

use std::io;
use std::path::PathBuf;

use magbridge_core::MetainfoError;
use thiserror::Error;

/// Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Failures that make a source unusable.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source path is missing or is not what the reader expects.
    #[error("source unavailable")]
    Unavailable {
        /// Path that was checked.
        path: PathBuf,
        /// Static reason for the failure.
        reason: &'static str,
    },
    /// IO failure during an up-front check.
    #[error("source io failure")]
    Io {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Required tables or columns are absent.
    #[error("source schema mismatch")]
    Schema {
        /// Table that failed the check.
        table: &'static str,
        /// Columns that were not found.
        missing: Vec<&'static str>,
    },
    /// The crawl database could not be opened or queried.
    #[error("source database failure")]
    Database {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Underlying driver error.
        source: sqlx::Error,
    },
}

/// A single file or row that could not be turned into a record.
#[derive(Debug, Error)]
pub enum MalformedRecord {
    /// A `.torrent` file did not decode.
    #[error("torrent file is malformed")]
    Torrent {
        /// File that failed.
        path: PathBuf,
        /// Decoder error.
        source: MetainfoError,
    },
    /// A `.torrent` file could not be read.
    #[error("torrent file is unreadable")]
    Unreadable {
        /// File that failed.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A directory entry could not be visited.
    #[error("directory entry is unreadable")]
    Walk {
        /// Entry path when known.
        path: Option<PathBuf>,
        /// Underlying walk error.
        source: walkdir::Error,
    },
    /// A crawl database row had unusable values.
    #[error("crawl row is malformed")]
    Row {
        /// `torrents.id` of the row.
        row_id: i64,
        /// Column that failed.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
    },
}

impl MalformedRecord {
    /// Human-readable location of the failing item, for logs.
    #[must_use]
    pub fn origin(&self) -> String {
        match self {
            Self::Torrent { path, .. } | Self::Unreadable { path, .. } => {
                path.display().to_string()
            }
            Self::Walk { path, .. } => path
                .as_ref()
                .map_or_else(|| "<unknown>".to_string(), |path| path.display().to_string()),
            Self::Row { row_id, .. } => format!("torrents.id={row_id}"),
        }
    }
}
