use std::fs;

use anyhow::Result;
use magbridge_core::{FileLayout, InfoHash};
use magbridge_sources::{
    MalformedRecord, SourceError, SourceEvent, SourceReader, TorrentDirOptions,
    TorrentFileSourceReader,
};
use magbridge_test_support::fixtures::{FixtureFile, TorrentFixture, write_raw};
use tempfile::TempDir;

fn options(root: &std::path::Path, recursive: bool) -> TorrentDirOptions {
    TorrentDirOptions {
        root: root.to_path_buf(),
        recursive,
        max_files_per_torrent: None,
        source_label: ".torrent".to_string(),
    }
}

async fn drain(reader: &mut TorrentFileSourceReader) -> Result<Vec<SourceEvent>> {
    let mut events = Vec::new();
    while let Some(event) = reader.next_event().await? {
        events.push(event);
    }
    Ok(events)
}

#[tokio::test]
async fn corrupt_file_does_not_stop_the_walk() -> Result<()> {
    let dir = TempDir::new()?;
    let sample = TorrentFixture::single("sample.iso", 700_000_000).creation_date(1_700_000_000);
    sample.write_to(dir.path(), "a-sample.torrent")?;
    let full = sample.to_bytes();
    write_raw(dir.path(), "b-truncated.torrent", &full[..full.len() / 2])?;
    write_raw(dir.path(), "c-notes.txt", b"ignored")?;

    let mut reader = TorrentFileSourceReader::open(options(dir.path(), false)).await?;
    let events = drain(&mut reader).await?;
    assert_eq!(events.len(), 2);

    match &events[0] {
        SourceEvent::Record(record) => {
            assert_eq!(record.name(), "sample.iso");
            assert_eq!(record.total_size(), 700_000_000);
            assert_eq!(record.infohash(), &InfoHash::v1_of(&sample.info_bytes()));
            assert_eq!(record.layout(), FileLayout::Single);
        }
        SourceEvent::Malformed(err) => panic!("sample should decode: {err:?}"),
    }
    match &events[1] {
        SourceEvent::Malformed(err @ MalformedRecord::Torrent { path, .. }) => {
            assert!(path.ends_with("b-truncated.torrent"));
            assert!(err.origin().ends_with("b-truncated.torrent"));
        }
        other => panic!("expected malformed torrent, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn recursion_is_opt_in_and_order_is_by_name() -> Result<()> {
    let dir = TempDir::new()?;
    let nested = dir.path().join("nested");
    fs::create_dir(&nested)?;
    TorrentFixture::single("zeta", 1).write_to(dir.path(), "z.torrent")?;
    TorrentFixture::single("alpha", 1).write_to(dir.path(), "a.torrent")?;
    TorrentFixture::single("deep", 1).write_to(&nested, "m.TORRENT")?;

    let names = |events: Vec<SourceEvent>| -> Vec<String> {
        events
            .into_iter()
            .filter_map(|event| match event {
                SourceEvent::Record(record) => Some(record.name().to_string()),
                SourceEvent::Malformed(_) => None,
            })
            .collect()
    };

    let mut flat = TorrentFileSourceReader::open(options(dir.path(), false)).await?;
    assert_eq!(names(drain(&mut flat).await?), vec!["alpha", "zeta"]);

    let mut deep = TorrentFileSourceReader::open(options(dir.path(), true)).await?;
    assert_eq!(names(drain(&mut deep).await?), vec!["alpha", "deep", "zeta"]);
    Ok(())
}

#[tokio::test]
async fn file_cap_keeps_true_count_and_total() -> Result<()> {
    let dir = TempDir::new()?;
    let files = (0..5)
        .map(|index| FixtureFile::new(&format!("part{index}.bin"), 10))
        .collect();
    TorrentFixture::multi("parts", files).write_to(dir.path(), "parts.torrent")?;

    let mut opts = options(dir.path(), false);
    opts.max_files_per_torrent = Some(2);
    let mut reader = TorrentFileSourceReader::open(opts).await?;
    let events = drain(&mut reader).await?;
    match events.as_slice() {
        [SourceEvent::Record(record)] => {
            assert_eq!(record.files().len(), 2);
            assert_eq!(record.file_count(), 5);
            assert_eq!(record.total_size(), 50);
        }
        other => panic!("expected one record, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn missing_root_is_unavailable() -> Result<()> {
    let dir = TempDir::new()?;
    let missing = dir.path().join("nope");
    assert!(matches!(
        TorrentFileSourceReader::open(options(&missing, true)).await.err(),
        Some(SourceError::Unavailable {
            reason: "directory does not exist",
            ..
        })
    ));

    let file = write_raw(dir.path(), "plain.torrent", b"de")?;
    assert!(matches!(
        TorrentFileSourceReader::open(options(&file, true)).await.err(),
        Some(SourceError::Unavailable {
            reason: "source path is not a directory",
            ..
        })
    ));
    Ok(())
}
