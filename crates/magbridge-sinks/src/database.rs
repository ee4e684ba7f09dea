//! Batched upserts into the bitmagnet Postgres schema.
//!
//! Each batch is one transaction covering `torrents`,
//! `torrents_torrent_sources`, and optionally `torrent_files` and
//! `torrent_contents`, so a torrent never becomes visible without its file
//! rows. Re-running the same input updates rows in place.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use magbridge_config::{ConnectionSettings, DatabaseSinkConfig, PaddingMode};
use magbridge_core::{FileLayout, InfoHash, TorrentRecord};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use tracing::{error, info, warn};

use crate::error::{SinkError, SinkResult};
use crate::sink::{FailedBatch, RecordSink, SinkProgress};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
// Postgres caps a statement at 65535 bind parameters; file rows bind six each.
const FILE_ROWS_PER_STATEMENT: usize = 10_000;

const ENSURE_SOURCE: &str = r"
    INSERT INTO torrent_sources (key, name, created_at, updated_at)
    VALUES ($1, $2, $3, $3)
    ON CONFLICT (key) DO NOTHING
";

/// Writes records to bitmagnet's tables in transactional batches.
pub struct DatabaseSink {
    pool: PgPool,
    config: DatabaseSinkConfig,
    source_key: String,
    run_started: DateTime<Utc>,
    pending: Vec<TorrentRecord>,
}

impl DatabaseSink {
    /// Connect to the destination and make sure the source row exists.
    ///
    /// The `torrent_sources.key` is the lowercased `source_label`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Connect`] when the server cannot be reached and
    /// [`SinkError::Database`] when the source row cannot be written.
    pub async fn connect(config: DatabaseSinkConfig, source_label: &str) -> SinkResult<Self> {
        let connection = &config.connection;
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect_with(connect_options(connection))
            .await
            .map_err(|source| SinkError::Connect {
                host: connection.host.clone(),
                port: connection.port,
                source,
            })?;

        let run_started = Utc::now();
        let source_key = source_label.to_lowercase();
        sqlx::query(ENSURE_SOURCE)
            .bind(&source_key)
            .bind(source_label)
            .bind(run_started)
            .execute(&pool)
            .await
            .map_err(|source| SinkError::Database {
                operation: "ensure torrent source",
                source,
            })?;

        info!(
            host = %connection.host,
            port = connection.port,
            database = %connection.database,
            source = %source_key,
            batch_size = config.batch_size,
            "connected to destination database"
        );
        Ok(Self {
            pool,
            source_key,
            run_started,
            pending: Vec::with_capacity(config.batch_size),
            config,
        })
    }

    async fn flush(&mut self) -> SinkResult<SinkProgress> {
        if self.pending.is_empty() {
            return Ok(SinkProgress::default());
        }
        let batch = std::mem::take(&mut self.pending);
        let rows = latest_per_infohash(&batch);
        let max_attempts = self.config.max_attempts.max(1);
        let mut delay = self.config.retry_backoff;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.write_batch(&rows).await {
                Ok(()) => {
                    info!(
                        records = batch.len(),
                        distinct = rows.len(),
                        attempt,
                        "committed batch"
                    );
                    return Ok(SinkProgress::committed(batch.len()));
                }
                Err(err) => err,
            };
            if attempt < max_attempts {
                warn!(
                    error = %err,
                    detail = ?err,
                    attempt,
                    max_attempts,
                    retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "batch failed; retrying"
                );
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
                continue;
            }
            if err.is_connection_loss() {
                error!(
                    error = %err,
                    detail = ?err,
                    records = batch.len(),
                    attempts = attempt,
                    "destination unavailable after retries"
                );
                return Err(err);
            }
            error!(
                error = %err,
                detail = ?err,
                records = batch.len(),
                attempts = attempt,
                "batch failed; records not committed"
            );
            return Ok(SinkProgress {
                committed: 0,
                failed: vec![FailedBatch {
                    infohashes: batch.iter().map(|record| *record.infohash()).collect(),
                    attempts: attempt,
                    error: err,
                }],
            });
        }
    }

    async fn write_batch(&self, rows: &[&TorrentRecord]) -> SinkResult<()> {
        let now = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(database("begin batch transaction"))?;

        self.upsert_torrents(&mut tx, rows, now).await?;
        self.upsert_sources(&mut tx, rows, now).await?;
        if self.config.files.enabled {
            self.upsert_files(&mut tx, rows, now).await?;
        }
        if self.config.insert_content {
            self.insert_contents(&mut tx, rows, now).await?;
        }

        tx.commit().await.map_err(database("commit batch"))
    }

    fn published_at(&self, record: &TorrentRecord) -> DateTime<Utc> {
        record.discovered_at().unwrap_or(self.run_started)
    }

    async fn upsert_torrents(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        rows: &[&TorrentRecord],
        now: DateTime<Utc>,
    ) -> SinkResult<()> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "INSERT INTO torrents \
             (info_hash, name, size, private, files_status, files_count, created_at, updated_at) ",
        );
        builder.push_values(rows, |mut row, record| {
            let files_count = match record.layout() {
                FileLayout::Multi => Some(saturating_i32(record.file_count())),
                FileLayout::Single | FileLayout::Unknown => None,
            };
            row.push_bind(record.infohash().as_bytes().to_vec())
                .push_bind(record.name().to_owned())
                .push_bind(record.total_size())
                .push_bind(record.is_private())
                .push_bind(record.layout().as_str())
                .push_unseparated("::files_status")
                .push_bind(files_count)
                .push_bind(self.published_at(record))
                .push_bind(now);
        });
        builder.push(
            " ON CONFLICT (info_hash) DO UPDATE SET \
             name = EXCLUDED.name, \
             size = EXCLUDED.size, \
             private = EXCLUDED.private, \
             files_status = EXCLUDED.files_status, \
             files_count = EXCLUDED.files_count, \
             updated_at = EXCLUDED.updated_at",
        );
        builder
            .build()
            .execute(&mut **tx)
            .await
            .map_err(database("upsert torrents"))?;
        Ok(())
    }

    async fn upsert_sources(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        rows: &[&TorrentRecord],
        now: DateTime<Utc>,
    ) -> SinkResult<()> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "INSERT INTO torrents_torrent_sources \
             (source, info_hash, published_at, created_at, updated_at) ",
        );
        builder.push_values(rows, |mut row, record| {
            row.push_bind(self.source_key.clone())
                .push_bind(record.infohash().as_bytes().to_vec())
                .push_bind(self.published_at(record))
                .push_bind(now)
                .push_bind(now);
        });
        builder.push(
            " ON CONFLICT (source, info_hash) DO UPDATE SET \
             published_at = EXCLUDED.published_at, \
             updated_at = EXCLUDED.updated_at",
        );
        builder
            .build()
            .execute(&mut **tx)
            .await
            .map_err(database("upsert torrent sources"))?;
        Ok(())
    }

    async fn upsert_files(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        rows: &[&TorrentRecord],
        now: DateTime<Utc>,
    ) -> SinkResult<()> {
        let files: Vec<FileRow<'_>> = rows
            .iter()
            .flat_map(|record| file_rows(record, self.config.padding, self.config.files.limit))
            .collect();
        for chunk in files.chunks(FILE_ROWS_PER_STATEMENT) {
            let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
                "INSERT INTO torrent_files (info_hash, index, path, size, created_at, updated_at) ",
            );
            builder.push_values(chunk, |mut row, file| {
                row.push_bind(file.infohash.as_bytes().to_vec())
                    .push_bind(file.index)
                    .push_bind(file.path.to_owned())
                    .push_bind(file.size)
                    .push_bind(now)
                    .push_bind(now);
            });
            builder.push(
                " ON CONFLICT (info_hash, path) DO UPDATE SET \
                 index = EXCLUDED.index, \
                 size = EXCLUDED.size, \
                 updated_at = EXCLUDED.updated_at",
            );
            builder
                .build()
                .execute(&mut **tx)
                .await
                .map_err(database("upsert torrent files"))?;
        }
        Ok(())
    }

    async fn insert_contents(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        rows: &[&TorrentRecord],
        now: DateTime<Utc>,
    ) -> SinkResult<()> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            "INSERT INTO torrent_contents (info_hash, languages, created_at, updated_at, tsv) ",
        );
        builder.push_values(rows, |mut row, record| {
            row.push_bind(record.infohash().as_bytes().to_vec())
                .push("'[]'::jsonb")
                .push_bind(self.published_at(record))
                .push_bind(now)
                .push("to_tsvector(")
                .push_bind_unseparated(record.infohash().to_hex())
                .push_unseparated(")");
        });
        builder.push(" ON CONFLICT DO NOTHING");
        builder
            .build()
            .execute(&mut **tx)
            .await
            .map_err(database("insert torrent contents"))?;
        Ok(())
    }
}

#[async_trait]
impl RecordSink for DatabaseSink {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn accept(&mut self, record: TorrentRecord) -> SinkResult<SinkProgress> {
        self.pending.push(record);
        if self.pending.len() >= self.config.batch_size {
            self.flush().await
        } else {
            Ok(SinkProgress::default())
        }
    }

    async fn finish(&mut self) -> SinkResult<SinkProgress> {
        let progress = self.flush().await?;
        self.pool.close().await;
        Ok(progress)
    }
}

pub(crate) struct FileRow<'a> {
    infohash: &'a InfoHash,
    index: i32,
    path: &'a str,
    size: i64,
}

/// File rows for one torrent: multi-file only, padding per `padding`, first
/// `limit` entries, one row per path.
pub(crate) fn file_rows(
    record: &TorrentRecord,
    padding: PaddingMode,
    limit: usize,
) -> Vec<FileRow<'_>> {
    if record.layout() != FileLayout::Multi {
        return Vec::new();
    }
    let mut seen = HashSet::new();
    record
        .files()
        .iter()
        .filter(|file| padding == PaddingMode::Include || !file.padding)
        .filter(|file| seen.insert(file.path.as_str()))
        .take(limit)
        .map(|file| FileRow {
            infohash: record.infohash(),
            index: saturating_i32(file.index),
            path: &file.path,
            size: file.size,
        })
        .collect()
}

/// Collapse repeated infohashes to their last occurrence, keeping first-seen order.
fn latest_per_infohash(batch: &[TorrentRecord]) -> Vec<&TorrentRecord> {
    let mut order = Vec::with_capacity(batch.len());
    let mut latest: HashMap<InfoHash, &TorrentRecord> = HashMap::with_capacity(batch.len());
    for record in batch {
        if latest.insert(*record.infohash(), record).is_none() {
            order.push(*record.infohash());
        }
    }
    order
        .iter()
        .filter_map(|infohash| latest.get(infohash).copied())
        .collect()
}

fn connect_options(connection: &ConnectionSettings) -> PgConnectOptions {
    let options = PgConnectOptions::new()
        .host(&connection.host)
        .port(connection.port)
        .database(&connection.database)
        .username(&connection.user);
    match &connection.password {
        Some(password) => options.password(password),
        None => options,
    }
}

fn saturating_i32(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn database(operation: &'static str) -> impl FnOnce(sqlx::Error) -> SinkError {
    move |source| SinkError::Database { operation, source }
}
