//! Builder for magnetico-style crawl databases.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

const SCHEMA: &[&str] = &[
    "CREATE TABLE torrents (
        id             INTEGER PRIMARY KEY,
        info_hash      BLOB NOT NULL UNIQUE,
        name           TEXT NOT NULL,
        total_size     INTEGER NOT NULL,
        discovered_on  INTEGER NOT NULL CHECK(discovered_on > 0)
    )",
    "CREATE TABLE files (
        id          INTEGER PRIMARY KEY,
        torrent_id  INTEGER REFERENCES torrents ON DELETE CASCADE ON UPDATE RESTRICT,
        size        INTEGER NOT NULL,
        path        TEXT NOT NULL
    )",
];

/// One file row of a crawl database fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlFile {
    /// Declared size.
    pub size: i64,
    /// Raw path bytes, stored as-is.
    pub path: Vec<u8>,
}

impl CrawlFile {
    /// File with a UTF-8 path.
    pub fn new(path: &str, size: i64) -> Self {
        Self {
            size,
            path: path.as_bytes().to_vec(),
        }
    }
}

/// Writable handle to a freshly created crawl database.
pub struct MagneticoFixture {
    path: PathBuf,
    pool: SqlitePool,
}

impl MagneticoFixture {
    /// Create a database with the magnetico schema at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be created or the schema fails to apply.
    pub async fn create(path: &Path) -> Result<Self> {
        let pool = open(path).await?;
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .context("failed to apply magnetico schema")?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            pool,
        })
    }

    /// Create a database containing only the given DDL, for schema-check tests.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be created or a statement fails.
    pub async fn with_custom_schema(path: &Path, statements: &[&str]) -> Result<Self> {
        let pool = open(path).await?;
        for statement in statements {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .context("failed to apply custom schema")?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            pool,
        })
    }

    /// Database file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert a torrent and its files; returns the row id.
    ///
    /// # Errors
    ///
    /// Returns an error when an insert fails.
    pub async fn insert(
        &self,
        info_hash: &[u8],
        name: &[u8],
        total_size: i64,
        discovered_on: i64,
        files: &[CrawlFile],
    ) -> Result<i64> {
        // Names are bound as blobs so tests can store non-UTF-8 bytes.
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO torrents (info_hash, name, total_size, discovered_on) \
             VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(info_hash)
        .bind(name)
        .bind(total_size)
        .bind(discovered_on)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert torrent row")?;

        for file in files {
            sqlx::query("INSERT INTO files (torrent_id, size, path) VALUES (?, ?, ?)")
                .bind(id)
                .bind(file.size)
                .bind(file.path.as_slice())
                .execute(&self.pool)
                .await
                .context("failed to insert file row")?;
        }
        Ok(id)
    }

    /// Flush and close the writer so readers see a consistent file.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

async fn open(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .journal_mode(SqliteJournalMode::Delete)
        .create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("failed to open sqlite fixture {}", path.display()))
}
