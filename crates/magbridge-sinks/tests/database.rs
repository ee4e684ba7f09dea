use std::time::Duration;

use anyhow::Result;
use chrono::DateTime;
use magbridge_config::{ConnectionSettings, DatabaseSinkConfig, FileRows, PaddingMode};
use magbridge_core::{FileLayout, InfoHash, TorrentFileEntry, TorrentRecord};
use magbridge_sinks::{DatabaseSink, RecordSink, SinkProgress};
use magbridge_test_support::postgres::{TestDatabase, start_postgres};
use sqlx::PgPool;

fn sink_config(db: &TestDatabase, batch_size: usize) -> Result<DatabaseSinkConfig> {
    let parts = db.connection_parts()?;
    Ok(DatabaseSinkConfig {
        connection: ConnectionSettings {
            host: parts.host,
            port: parts.port,
            database: parts.database,
            user: parts.user,
            password: parts.password,
        },
        batch_size,
        max_attempts: 2,
        retry_backoff: Duration::from_millis(1),
        files: FileRows {
            enabled: true,
            limit: 2,
        },
        insert_content: true,
        padding: PaddingMode::Exclude,
    })
}

fn database_or_skip() -> Option<TestDatabase> {
    match start_postgres() {
        Ok(db) => Some(db),
        Err(err) => {
            eprintln!("skipping postgres test: {err:#}");
            None
        }
    }
}

fn album(name: &str) -> TorrentRecord {
    let files = vec![
        TorrentFileEntry::new(0, "01.flac", 40),
        TorrentFileEntry::new(1, "_____padding_file_0", 8).with_padding(true),
        TorrentFileEntry::new(2, "02.flac", 40),
        TorrentFileEntry::new(3, "03.flac", 12),
    ];
    TorrentRecord::new(InfoHash::v1_of(b"album"), name, 100, "Magnetico")
        .with_discovered_at(DateTime::from_timestamp(1_600_000_000, 0))
        .with_files(FileLayout::Multi, files, 4)
}

fn iso() -> TorrentRecord {
    TorrentRecord::new(InfoHash::v1_of(b"iso"), "sample.iso", 700_000_000, "Magnetico").with_files(
        FileLayout::Single,
        vec![TorrentFileEntry::new(0, "sample.iso", 700_000_000)],
        1,
    )
}

async fn run(sink: &mut DatabaseSink, records: Vec<TorrentRecord>) -> Result<SinkProgress> {
    let mut total = SinkProgress::default();
    for record in records {
        total.absorb(sink.accept(record).await?);
    }
    total.absorb(sink.finish().await?);
    Ok(total)
}

async fn count(pool: &PgPool, table: &str) -> Result<i64> {
    Ok(sqlx::query_scalar(&format!("SELECT count(*) FROM {table}"))
        .fetch_one(pool)
        .await?)
}

#[tokio::test]
async fn rerun_updates_rows_instead_of_duplicating() -> Result<()> {
    let Some(db) = database_or_skip() else {
        return Ok(());
    };
    let pool = PgPool::connect(db.connection_string()).await?;

    let mut first = DatabaseSink::connect(sink_config(&db, 10)?, "Magnetico").await?;
    let progress = run(&mut first, vec![album("Album v1"), iso()]).await?;
    assert_eq!(progress.committed, 2);
    assert!(progress.failed.is_empty());

    let mut second = DatabaseSink::connect(sink_config(&db, 10)?, "Magnetico").await?;
    run(&mut second, vec![album("Album v2")]).await?;

    assert_eq!(count(&pool, "torrents").await?, 2);
    assert_eq!(count(&pool, "torrents_torrent_sources").await?, 2);
    assert_eq!(count(&pool, "torrent_contents").await?, 2);
    assert_eq!(count(&pool, "torrent_sources").await?, 1);

    let (name, status, files_count): (String, String, Option<i32>) = sqlx::query_as(
        "SELECT name, files_status::text, files_count FROM torrents WHERE info_hash = $1",
    )
    .bind(InfoHash::v1_of(b"album").as_bytes().to_vec())
    .fetch_one(&pool)
    .await?;
    assert_eq!(name, "Album v2");
    assert_eq!(status, "multi");
    assert_eq!(files_count, Some(4));

    let key: String = sqlx::query_scalar("SELECT source FROM torrents_torrent_sources LIMIT 1")
        .fetch_one(&pool)
        .await?;
    assert_eq!(key, "magnetico");

    let paths: Vec<String> =
        sqlx::query_scalar("SELECT path FROM torrent_files ORDER BY index")
            .fetch_all(&pool)
            .await?;
    assert_eq!(paths, vec!["01.flac", "02.flac"]);
    pool.close().await;
    Ok(())
}

#[tokio::test]
async fn failed_batch_is_reported_and_later_batches_commit() -> Result<()> {
    let Some(db) = database_or_skip() else {
        return Ok(());
    };
    let pool = PgPool::connect(db.connection_string()).await?;
    let mut sink = DatabaseSink::connect(sink_config(&db, 2)?, "crawl").await?;

    let poisoned = TorrentRecord::new(InfoHash::v1_of(b"nul"), "bad\0name", 1, "crawl");
    let progress = run(
        &mut sink,
        vec![poisoned, iso(), album("after the failure")],
    )
    .await?;

    assert_eq!(progress.committed, 1);
    assert_eq!(progress.failed.len(), 1);
    assert_eq!(progress.failed[0].attempts, 2);
    assert_eq!(
        progress.failed[0].infohashes,
        vec![InfoHash::v1_of(b"nul"), InfoHash::v1_of(b"iso")]
    );
    assert!(!progress.failed[0].error.is_connection_loss());
    assert_eq!(count(&pool, "torrents").await?, 1);
    pool.close().await;
    Ok(())
}
