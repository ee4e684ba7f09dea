//! Raw settings and the validated configuration built from them.

use std::fmt::{self, Debug, Formatter};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use magbridge_core::{NegativeSizePolicy, PaddingMode, SanitizerConfig};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which reader produces records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// magnetico crawl database.
    Sqlite,
    /// Directory of `.torrent` files.
    TorrentDir,
}

impl FromStr for SourceKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "magnetico" => Ok(Self::Sqlite),
            "torrent-dir" | "torrents" | "dir" => Ok(Self::TorrentDir),
            _ => Err(ConfigError::InvalidField {
                field: "source_kind",
                value: Some(value.to_string()),
                reason: "expected sqlite or torrent-dir",
            }),
        }
    }
}

/// Which sink consumes records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SinkKind {
    /// bitmagnet import JSON.
    Json,
    /// bitmagnet Postgres tables.
    Database,
}

impl FromStr for SinkKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "database" | "db" | "postgres" => Ok(Self::Database),
            _ => Err(ConfigError::InvalidField {
                field: "sink_kind",
                value: Some(value.to_string()),
                reason: "expected json or database",
            }),
        }
    }
}

/// How JSON records are framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonLayout {
    /// One JSON array per output file.
    #[default]
    Array,
    /// Newline-delimited objects.
    Lines,
}

impl FromStr for JsonLayout {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "array" => Ok(Self::Array),
            "lines" | "ndjson" | "jsonl" => Ok(Self::Lines),
            _ => Err(ConfigError::InvalidField {
                field: "json_layout",
                value: Some(value.to_string()),
                reason: "expected array or lines",
            }),
        }
    }
}

/// Raw settings as supplied by the CLI, environment, or a settings file.
///
/// Every field is optional; [`IngestConfig::from_settings`] decides what is
/// required for the chosen source and sink.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestSettings {
    /// Reader kind.
    pub source_kind: Option<SourceKind>,
    /// Database file or torrent directory.
    pub source_path: Option<PathBuf>,
    /// Read the crawl database `files` table.
    pub load_files: Option<bool>,
    /// Walk subdirectories.
    pub recursive: Option<bool>,
    /// File entries kept per decoded `.torrent`.
    pub max_files_per_torrent: Option<usize>,
    /// Sink kind.
    pub sink_kind: Option<SinkKind>,
    /// JSON output file; stdout when absent.
    pub output: Option<PathBuf>,
    /// Records per JSON output file.
    pub split_size: Option<usize>,
    /// Create missing output directories.
    pub create_dirs: Option<bool>,
    /// JSON framing.
    pub json_layout: Option<JsonLayout>,
    /// Destination host.
    pub db_host: Option<String>,
    /// Destination port.
    pub db_port: Option<u32>,
    /// Destination database name.
    pub db_name: Option<String>,
    /// Destination user.
    pub db_user: Option<String>,
    /// Destination password.
    pub db_password: Option<String>,
    /// Records per transaction.
    pub batch_size: Option<usize>,
    /// Attempts per batch.
    pub max_attempts: Option<u32>,
    /// Initial retry delay in milliseconds.
    pub retry_backoff_ms: Option<u64>,
    /// Write `torrent_files` rows.
    pub add_files: Option<bool>,
    /// Maximum `torrent_files` rows per torrent.
    pub file_limit: Option<usize>,
    /// Write `torrent_contents` search rows.
    pub insert_content: Option<bool>,
    /// Padding handling for `torrent_files`, overriding `padding`.
    pub sink_padding: Option<PaddingMode>,
    /// Negative-size policy.
    pub negative_size: Option<NegativeSizePolicy>,
    /// Padding handling in the sanitizer.
    pub padding: Option<PaddingMode>,
    /// Provenance tag.
    pub source_label: Option<String>,
    /// Run everything but the sink writes.
    pub dry_run: Option<bool>,
}

impl IngestSettings {
    /// Layer `overrides` on top of `self`; any value set in `overrides` wins.
    #[must_use]
    pub fn overlay(self, overrides: Self) -> Self {
        Self {
            source_kind: overrides.source_kind.or(self.source_kind),
            source_path: overrides.source_path.or(self.source_path),
            load_files: overrides.load_files.or(self.load_files),
            recursive: overrides.recursive.or(self.recursive),
            max_files_per_torrent: overrides
                .max_files_per_torrent
                .or(self.max_files_per_torrent),
            sink_kind: overrides.sink_kind.or(self.sink_kind),
            output: overrides.output.or(self.output),
            split_size: overrides.split_size.or(self.split_size),
            create_dirs: overrides.create_dirs.or(self.create_dirs),
            json_layout: overrides.json_layout.or(self.json_layout),
            db_host: overrides.db_host.or(self.db_host),
            db_port: overrides.db_port.or(self.db_port),
            db_name: overrides.db_name.or(self.db_name),
            db_user: overrides.db_user.or(self.db_user),
            db_password: overrides.db_password.or(self.db_password),
            batch_size: overrides.batch_size.or(self.batch_size),
            max_attempts: overrides.max_attempts.or(self.max_attempts),
            retry_backoff_ms: overrides.retry_backoff_ms.or(self.retry_backoff_ms),
            add_files: overrides.add_files.or(self.add_files),
            file_limit: overrides.file_limit.or(self.file_limit),
            insert_content: overrides.insert_content.or(self.insert_content),
            sink_padding: overrides.sink_padding.or(self.sink_padding),
            negative_size: overrides.negative_size.or(self.negative_size),
            padding: overrides.padding.or(self.padding),
            source_label: overrides.source_label.or(self.source_label),
            dry_run: overrides.dry_run.or(self.dry_run),
        }
    }
}

/// Validated run configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Reader settings.
    pub source: SourceConfig,
    /// Sink settings.
    pub sink: SinkConfig,
    /// Sanitizer settings as applied to every record.
    pub sanitizer: SanitizerConfig,
    /// Provenance tag for every record.
    pub source_label: String,
    /// Suppress sink writes.
    pub dry_run: bool,
}

/// Reader settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceConfig {
    /// magnetico crawl database.
    Sqlite {
        /// Database file.
        path: PathBuf,
        /// Read the `files` table.
        load_files: bool,
    },
    /// Directory of `.torrent` files.
    TorrentDir {
        /// Directory to walk.
        root: PathBuf,
        /// Walk subdirectories.
        recursive: bool,
        /// File entries kept per torrent.
        max_files_per_torrent: Option<usize>,
    },
}

/// Sink settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkConfig {
    /// JSON output.
    Json(JsonSinkConfig),
    /// Postgres output.
    Database(DatabaseSinkConfig),
}

/// JSON sink settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonSinkConfig {
    /// Where output goes.
    pub target: JsonTarget,
    /// Record framing.
    pub layout: JsonLayout,
}

/// Destination of JSON output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonTarget {
    /// Standard output, never split.
    Stdout,
    /// One or more files.
    File {
        /// First output file; later parts derive their names from it.
        path: PathBuf,
        /// Records per file.
        split_size: Option<NonZeroUsize>,
        /// Create the parent directory when missing.
        create_dirs: bool,
    },
}

/// Postgres sink settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSinkConfig {
    /// Server and credentials.
    pub connection: ConnectionSettings,
    /// Records per transaction.
    pub batch_size: usize,
    /// Attempts per batch.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub retry_backoff: Duration,
    /// `torrent_files` handling.
    pub files: FileRows,
    /// Write `torrent_contents` rows.
    pub insert_content: bool,
    /// Padding handling for `torrent_files` rows.
    pub padding: PaddingMode,
}

/// `torrent_files` handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRows {
    /// Write file rows at all.
    pub enabled: bool,
    /// Maximum rows per torrent.
    pub limit: usize,
}

/// Destination server and credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Host name or address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// User name.
    pub user: String,
    /// Password, when the server requires one.
    pub password: Option<String>,
}

impl Debug for ConnectionSettings {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
