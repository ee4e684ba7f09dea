//! Reader for magnetico crawl databases.
//!
//! # Design
//!
//! - The file is checked (exists, readable, SQLite header) and the schema is
//!   validated once at open; row-level problems become [`MalformedRecord`]s.
//! - Torrents are paged by `id` (keyset), so memory holds one page at a time.
//! - File rows are read per torrent in stored (`rowid`) order.
//! - Text columns are read as blobs and decoded with the same fallback chain
//!   used for `.torrent` names.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use magbridge_core::{FileLayout, InfoHash, TorrentFileEntry, TorrentRecord, decode_text};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::error::{MalformedRecord, SourceError, SourceResult};
use crate::reader::{SourceEvent, SourceReader};

const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";
const TORRENT_COLUMNS: [&str; 5] = ["id", "info_hash", "name", "total_size", "discovered_on"];
const FILE_COLUMNS: [&str; 3] = ["torrent_id", "size", "path"];
const DEFAULT_PAGE_SIZE: u32 = 1_000;

/// Settings for [`SqliteSourceReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqliteOptions {
    /// Database file.
    pub path: PathBuf,
    /// Whether to read the `files` table.
    pub load_files: bool,
    /// Provenance tag for every record.
    pub source_label: String,
    /// Torrent rows fetched per query.
    pub page_size: u32,
}

impl SqliteOptions {
    /// Options with the default page size.
    pub fn new(
        path: impl Into<PathBuf>,
        load_files: bool,
        source_label: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            load_files,
            source_label: source_label.into(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

struct TorrentRow {
    id: i64,
    info_hash: Vec<u8>,
    name: Vec<u8>,
    total_size: Option<i64>,
    discovered_on: Option<i64>,
}

/// Streams records out of a magnetico-schema database.
pub struct SqliteSourceReader {
    options: SqliteOptions,
    pool: SqlitePool,
    last_id: i64,
    page: VecDeque<Result<TorrentRow, MalformedRecord>>,
    exhausted: bool,
}

impl SqliteSourceReader {
    /// Open the database read-only and validate its schema.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the file is missing, unreadable, not a
    /// SQLite database, or lacks the required tables and columns.
    pub async fn open(options: SqliteOptions) -> SourceResult<Self> {
        check_file(&options.path).await?;

        let connect = SqliteConnectOptions::new()
            .filename(&options.path)
            .read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect)
            .await
            .map_err(|source| SourceError::Database {
                operation: "open",
                source,
            })?;

        check_columns(&pool, "torrents", &TORRENT_COLUMNS).await?;
        if options.load_files {
            check_columns(&pool, "files", &FILE_COLUMNS).await?;
        }

        info!(
            path = %options.path.display(),
            load_files = options.load_files,
            "opened crawl database"
        );
        Ok(Self {
            options,
            pool,
            last_id: i64::MIN,
            page: VecDeque::new(),
            exhausted: false,
        })
    }

    async fn fetch_page(&mut self) -> SourceResult<()> {
        let page_size = self.options.page_size.max(1);
        let rows = sqlx::query(
            "SELECT id, CAST(info_hash AS BLOB) AS info_hash, CAST(name AS BLOB) AS name, \
             total_size, discovered_on FROM torrents WHERE id > ? ORDER BY id LIMIT ?",
        )
        .bind(self.last_id)
        .bind(i64::from(page_size))
        .fetch_all(&self.pool)
        .await
        .map_err(|source| SourceError::Database {
            operation: "fetch torrents page",
            source,
        })?;

        if rows.len() < page_size as usize {
            self.exhausted = true;
        }
        for row in &rows {
            let id: i64 = row.try_get("id").map_err(|source| SourceError::Database {
                operation: "read torrent id",
                source,
            })?;
            self.last_id = id;
            self.page.push_back(decode_row(id, row));
        }
        debug!(rows = rows.len(), last_id = self.last_id, "fetched crawl page");
        Ok(())
    }

    /// File rows of one torrent; the inner error marks the torrent malformed.
    async fn load_files(
        &self,
        torrent_id: i64,
    ) -> SourceResult<Result<Vec<(i64, Vec<u8>)>, MalformedRecord>> {
        let rows = sqlx::query(
            "SELECT size, CAST(path AS BLOB) AS path FROM files \
             WHERE torrent_id = ? ORDER BY rowid",
        )
        .bind(torrent_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|source| SourceError::Database {
            operation: "fetch file rows",
            source,
        })?;

        let malformed = |field: &'static str| MalformedRecord::Row {
            row_id: torrent_id,
            field,
            reason: "unexpected column type",
        };
        Ok(rows
            .iter()
            .map(|row| {
                let size: i64 = row.try_get("size").map_err(|_| malformed("files.size"))?;
                let path: Vec<u8> = row.try_get("path").map_err(|_| malformed("files.path"))?;
                Ok((size, path))
            })
            .collect())
    }

    async fn build_record(&self, row: TorrentRow) -> SourceResult<SourceEvent> {
        let infohash = match parse_info_hash(&row.info_hash) {
            Some(hash) => hash,
            None => {
                return Ok(SourceEvent::Malformed(MalformedRecord::Row {
                    row_id: row.id,
                    field: "info_hash",
                    reason: "not a 20 or 32 byte hash",
                }));
            }
        };
        let name = decode_text(&row.name);

        let (layout, files) = if self.options.load_files {
            let raw = match self.load_files(row.id).await? {
                Ok(raw) => raw,
                Err(malformed) => return Ok(SourceEvent::Malformed(malformed)),
            };
            let layout = if raw.len() == 1 {
                FileLayout::Single
            } else {
                FileLayout::Multi
            };
            let files: Vec<TorrentFileEntry> = raw
                .into_iter()
                .enumerate()
                .map(|(index, (size, path))| {
                    TorrentFileEntry::new(index, decode_text(&path).text, size)
                })
                .collect();
            (layout, files)
        } else {
            (FileLayout::Unknown, Vec::new())
        };

        let total_size = match row.total_size {
            Some(size) => size,
            None => match files
                .iter()
                .try_fold(0_i64, |acc, file| acc.checked_add(file.size))
            {
                Some(sum) => sum,
                None => {
                    return Ok(SourceEvent::Malformed(MalformedRecord::Row {
                        row_id: row.id,
                        field: "total_size",
                        reason: "file sizes overflow",
                    }));
                }
            },
        };

        let discovered_at = row
            .discovered_on
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
        let file_count = files.len();
        let label = self.options.source_label.clone();
        Ok(SourceEvent::Record(
            TorrentRecord::new(infohash, name.text, total_size, label)
                .with_name_repaired(name.repaired)
                .with_discovered_at(discovered_at)
                .with_files(layout, files, file_count),
        ))
    }
}

#[async_trait]
impl SourceReader for SqliteSourceReader {
    fn label(&self) -> &str {
        &self.options.source_label
    }

    async fn next_event(&mut self) -> SourceResult<Option<SourceEvent>> {
        if self.page.is_empty() && !self.exhausted {
            self.fetch_page().await?;
        }
        match self.page.pop_front() {
            None => Ok(None),
            Some(Err(malformed)) => Ok(Some(SourceEvent::Malformed(malformed))),
            Some(Ok(row)) => self.build_record(row).await.map(Some),
        }
    }
}

fn decode_row(id: i64, row: &SqliteRow) -> Result<TorrentRow, MalformedRecord> {
    let malformed = |field: &'static str| MalformedRecord::Row {
        row_id: id,
        field,
        reason: "unexpected column type",
    };
    Ok(TorrentRow {
        id,
        info_hash: row
            .try_get::<Option<Vec<u8>>, _>("info_hash")
            .map_err(|_| malformed("info_hash"))?
            .unwrap_or_default(),
        name: row
            .try_get::<Option<Vec<u8>>, _>("name")
            .map_err(|_| malformed("name"))?
            .unwrap_or_default(),
        total_size: row
            .try_get("total_size")
            .map_err(|_| malformed("total_size"))?,
        discovered_on: row
            .try_get("discovered_on")
            .map_err(|_| malformed("discovered_on"))?,
    })
}

/// Accepts raw 20/32-byte hashes and their 40/64-character hex text.
fn parse_info_hash(raw: &[u8]) -> Option<InfoHash> {
    InfoHash::from_bytes(raw).ok().or_else(|| {
        std::str::from_utf8(raw)
            .ok()
            .filter(|text| matches!(text.len(), 40 | 64))
            .and_then(|text| InfoHash::from_hex(text).ok())
    })
}

async fn check_file(path: &Path) -> SourceResult<()> {
    let metadata = tokio::fs::metadata(path).await.map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            SourceError::Unavailable {
                path: path.to_path_buf(),
                reason: "database file does not exist",
            }
        } else {
            SourceError::Io {
                operation: "stat database file",
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    if !metadata.is_file() {
        return Err(SourceError::Unavailable {
            path: path.to_path_buf(),
            reason: "database path is not a file",
        });
    }

    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|source| SourceError::Io {
            operation: "open database file",
            path: path.to_path_buf(),
            source,
        })?;
    let mut header = [0_u8; 16];
    let header_ok = match file.read_exact(&mut header).await {
        Ok(_) => &header == SQLITE_HEADER,
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => false,
        Err(source) => {
            return Err(SourceError::Io {
                operation: "read database header",
                path: path.to_path_buf(),
                source,
            });
        }
    };
    if !header_ok {
        return Err(SourceError::Unavailable {
            path: path.to_path_buf(),
            reason: "file is not a SQLite 3 database",
        });
    }
    Ok(())
}

async fn check_columns(
    pool: &SqlitePool,
    table: &'static str,
    required: &[&'static str],
) -> SourceResult<()> {
    let present: HashSet<String> =
        sqlx::query_scalar::<_, String>("SELECT name FROM pragma_table_info(?)")
            .bind(table)
            .fetch_all(pool)
            .await
            .map_err(|source| SourceError::Database {
                operation: "inspect schema",
                source,
            })?
            .into_iter()
            .collect();
    let missing: Vec<&'static str> = required
        .iter()
        .copied()
        .filter(|column| !present.contains(*column))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(SourceError::Schema { table, missing })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_hash_accepts_blob_and_hex_forms() {
        let blob = [0x11_u8; 20];
        assert_eq!(parse_info_hash(&blob), InfoHash::from_bytes(&blob).ok());
        let hex_text = "11".repeat(20);
        assert_eq!(parse_info_hash(hex_text.as_bytes()), InfoHash::from_bytes(&blob).ok());
        assert!(parse_info_hash(b"short").is_none());
        assert!(parse_info_hash(&[0_u8; 21]).is_none());
    }
}
