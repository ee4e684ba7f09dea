//! Default values and hard limits applied during validation.

/// Label used for records read from a crawl database.
pub const SQLITE_SOURCE_LABEL: &str = "magnetico";
/// Label used for records read from a `.torrent` directory.
pub const TORRENT_DIR_SOURCE_LABEL: &str = ".torrent";
/// Records per database transaction.
pub const DEFAULT_BATCH_SIZE: usize = 1_000;
/// Upper bound on records per database transaction.
pub const MAX_BATCH_SIZE: usize = 5_000;
/// Attempts per batch before it is reported as failed.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Delay before the first retry; doubles on each further attempt.
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;
/// File rows written per torrent.
pub const DEFAULT_FILE_LIMIT: usize = 500;
/// Destination server port.
pub const DEFAULT_DB_PORT: u16 = 5432;
