//! bitmagnet import JSON, streamed one record at a time.
//!
//! Array layout writes `[`, then each object prefixed by `\n` or `,\n`, then
//! `\n]` on close, so a file is valid JSON after every completed part even
//! though nothing is buffered beyond one record. Split parts are named after
//! the index of their first record: `out.json`, `out-1001.json`,
//! `out-2001.json`, and so on for a split size of 1000.

use std::fs::{self, File};
use std::io::{self, BufWriter, Stdout, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use magbridge_config::{JsonLayout, JsonSinkConfig, JsonTarget};
use magbridge_core::{InfoHash, TorrentRecord};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{SinkError, SinkResult};
use crate::sink::{RecordSink, SinkProgress};

const PUBLISHED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S.000Z";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ImportItem<'a> {
    info_hash: &'a InfoHash,
    name: &'a str,
    size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    published_at: Option<String>,
    source: &'a str,
}

impl<'a> From<&'a TorrentRecord> for ImportItem<'a> {
    fn from(record: &'a TorrentRecord) -> Self {
        Self {
            info_hash: record.infohash(),
            name: record.name(),
            size: record.total_size(),
            published_at: record
                .discovered_at()
                .map(|at| at.format(PUBLISHED_AT_FORMAT).to_string()),
            source: record.source_label(),
        }
    }
}

enum Output {
    Stdout(BufWriter<Stdout>),
    File {
        path: PathBuf,
        writer: BufWriter<File>,
    },
}

impl Output {
    fn path(&self) -> Option<PathBuf> {
        match self {
            Self::Stdout(_) => None,
            Self::File { path, .. } => Some(path.clone()),
        }
    }

    fn write_all(&mut self, bytes: &[u8], operation: &'static str) -> SinkResult<()> {
        let result = match self {
            Self::Stdout(writer) => writer.write_all(bytes).and_then(|()| writer.flush()),
            Self::File { writer, .. } => writer.write_all(bytes).and_then(|()| writer.flush()),
        };
        result.map_err(|source| SinkError::Io {
            operation,
            path: self.path(),
            source,
        })
    }
}

/// Streams records as bitmagnet import objects to stdout or to split files.
///
/// File output is opened lazily on the first record. Only `infoHash`, `name`,
/// `size`, `publishedAt`, and `source` are emitted; file lists never are.
pub struct JsonStreamSink {
    target: JsonTarget,
    layout: JsonLayout,
    output: Option<Output>,
    parts_opened: usize,
    in_part: usize,
    written: usize,
    finished: bool,
}

impl JsonStreamSink {
    /// Build a sink; nothing is opened until the first record or `finish`.
    #[must_use]
    pub fn new(config: JsonSinkConfig) -> Self {
        Self {
            target: config.target,
            layout: config.layout,
            output: None,
            parts_opened: 0,
            in_part: 0,
            written: 0,
            finished: false,
        }
    }

    /// Records written so far across all parts.
    #[must_use]
    pub const fn written(&self) -> usize {
        self.written
    }

    const fn split_size(&self) -> Option<NonZeroUsize> {
        match &self.target {
            JsonTarget::Stdout => None,
            JsonTarget::File { split_size, .. } => *split_size,
        }
    }

    fn open_next(&mut self) -> SinkResult<()> {
        let mut output = match &self.target {
            JsonTarget::Stdout => Output::Stdout(BufWriter::new(io::stdout())),
            JsonTarget::File {
                path,
                split_size,
                create_dirs,
            } => {
                let part = split_size.map_or(0, |size| self.parts_opened * size.get());
                let path = part_path(path, part);
                if *create_dirs {
                    ensure_parent(&path)?;
                }
                let file = File::create(&path).map_err(|source| SinkError::Io {
                    operation: "create output file",
                    path: Some(path.clone()),
                    source,
                })?;
                info!(path = %path.display(), "opened JSON output");
                Output::File {
                    path,
                    writer: BufWriter::new(file),
                }
            }
        };
        if self.layout == JsonLayout::Array {
            output.write_all(b"[", "open JSON array")?;
        }
        self.output = Some(output);
        self.parts_opened += 1;
        self.in_part = 0;
        Ok(())
    }

    fn close_current(&mut self) -> SinkResult<()> {
        let Some(mut output) = self.output.take() else {
            return Ok(());
        };
        if self.layout == JsonLayout::Array {
            let closing: &[u8] = if self.in_part == 0 { b"]\n" } else { b"\n]\n" };
            output.write_all(closing, "close JSON array")?;
        }
        debug!(records = self.in_part, path = ?output.path(), "closed JSON output");
        Ok(())
    }

    fn write_record(&mut self, record: &TorrentRecord) -> SinkResult<()> {
        if self.output.is_some()
            && self
                .split_size()
                .is_some_and(|size| self.in_part >= size.get())
        {
            self.close_current()?;
        }
        if self.output.is_none() {
            self.open_next()?;
        }

        let mut line: Vec<u8> = Vec::with_capacity(256);
        if self.layout == JsonLayout::Array {
            let separator: &[u8] = if self.in_part == 0 { b"\n" } else { b",\n" };
            line.extend_from_slice(separator);
        }
        serde_json::to_writer(&mut line, &ImportItem::from(record))
            .map_err(|source| SinkError::Serialize { source })?;
        if self.layout == JsonLayout::Lines {
            line.push(b'\n');
        }
        if let Some(output) = self.output.as_mut() {
            output.write_all(&line, "write record")?;
        }
        self.in_part += 1;
        self.written += 1;
        Ok(())
    }
}

#[async_trait]
impl RecordSink for JsonStreamSink {
    fn name(&self) -> &'static str {
        "json"
    }

    async fn accept(&mut self, record: TorrentRecord) -> SinkResult<SinkProgress> {
        self.write_record(&record)?;
        Ok(SinkProgress::committed(1))
    }

    async fn finish(&mut self) -> SinkResult<SinkProgress> {
        if self.finished {
            return Ok(SinkProgress::default());
        }
        // An empty run still produces a valid document unless output is split.
        if self.output.is_none() && self.parts_opened == 0 && self.split_size().is_none() {
            self.open_next()?;
        }
        self.close_current()?;
        self.finished = true;
        info!(
            records = self.written,
            parts = self.parts_opened,
            "JSON output complete"
        );
        Ok(SinkProgress::default())
    }
}

/// Path of the part whose first record has zero-based index `first_record`.
///
/// The first part keeps `base` unchanged; later parts insert `-<n>` before the
/// extension, where `n` is the one-based index of their first record.
#[must_use]
pub fn part_path(base: &Path, first_record: usize) -> PathBuf {
    if first_record == 0 {
        return base.to_path_buf();
    }
    let stem = base
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match base.extension() {
        Some(ext) => format!("{stem}-{}.{}", first_record + 1, ext.to_string_lossy()),
        None => format!("{stem}-{}", first_record + 1),
    };
    base.with_file_name(name)
}

fn ensure_parent(path: &Path) -> SinkResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| SinkError::Io {
                operation: "create output directory",
                path: Some(parent.to_path_buf()),
                source,
            })
        }
        _ => Ok(()),
    }
}
