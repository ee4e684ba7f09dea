//! Canonical torrent record shared by every source and sink.

use chrono::{DateTime, Utc};

use crate::infohash::InfoHash;

/// How a torrent lays out its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileLayout {
    /// One payload file described by `info.length`.
    Single,
    /// A file list described by `info.files` or a v2 file tree.
    Multi,
    /// File-level detail was not available from the source.
    Unknown,
}

impl FileLayout {
    /// Label used by the destination `files_status` column.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Multi => "multi",
            Self::Unknown => "no_info",
        }
    }
}

/// One entry of a torrent's file list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentFileEntry {
    /// Position in the declared file list, counted before any filtering.
    pub index: usize,
    /// Path relative to the torrent root, `/`-separated.
    pub path: String,
    /// Declared size in bytes.
    pub size: i64,
    /// Whether the entry is an alignment padding file.
    pub padding: bool,
}

impl TorrentFileEntry {
    /// Build a non-padding entry.
    #[must_use]
    pub fn new(index: usize, path: impl Into<String>, size: i64) -> Self {
        Self {
            index,
            path: path.into(),
            size,
            padding: false,
        }
    }

    /// Mark the entry as a padding file.
    #[must_use]
    pub const fn with_padding(mut self, padding: bool) -> Self {
        self.padding = padding;
        self
    }
}

/// Normalised torrent descriptor produced by a source and consumed by exactly one sink.
///
/// The infohash is fixed at construction. `total_size` reflects the source's
/// declared size and is never recomputed when padding entries are filtered
/// out of `files`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentRecord {
    infohash: InfoHash,
    name: String,
    name_repaired: bool,
    total_size: i64,
    discovered_at: Option<DateTime<Utc>>,
    layout: FileLayout,
    files: Vec<TorrentFileEntry>,
    file_count: usize,
    private: bool,
    source_label: String,
}

impl TorrentRecord {
    /// Start a record with no file detail.
    #[must_use]
    pub fn new(
        infohash: InfoHash,
        name: impl Into<String>,
        total_size: i64,
        source_label: impl Into<String>,
    ) -> Self {
        Self {
            infohash,
            name: name.into(),
            name_repaired: false,
            total_size,
            discovered_at: None,
            layout: FileLayout::Unknown,
            files: Vec::new(),
            file_count: 0,
            private: false,
            source_label: source_label.into(),
        }
    }

    /// Attach the discovery timestamp.
    #[must_use]
    pub const fn with_discovered_at(mut self, discovered_at: Option<DateTime<Utc>>) -> Self {
        self.discovered_at = discovered_at;
        self
    }

    /// Attach file detail. `file_count` is the declared count, which may exceed
    /// `files.len()` when the list was capped.
    #[must_use]
    pub fn with_files(
        mut self,
        layout: FileLayout,
        files: Vec<TorrentFileEntry>,
        file_count: usize,
    ) -> Self {
        self.layout = layout;
        self.file_count = file_count.max(files.len());
        self.files = files;
        self
    }

    /// Flag the name as recovered from a non-UTF-8 encoding.
    #[must_use]
    pub const fn with_name_repaired(mut self, repaired: bool) -> Self {
        self.name_repaired = repaired;
        self
    }

    /// Mark the torrent as private (`info.private == 1`).
    #[must_use]
    pub const fn with_private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    /// Content identifier.
    #[must_use]
    pub const fn infohash(&self) -> &InfoHash {
        &self.infohash
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the name went through encoding repair.
    #[must_use]
    pub const fn name_repaired(&self) -> bool {
        self.name_repaired
    }

    /// Declared total size in bytes.
    #[must_use]
    pub const fn total_size(&self) -> i64 {
        self.total_size
    }

    /// When the torrent was first observed, if known.
    #[must_use]
    pub const fn discovered_at(&self) -> Option<DateTime<Utc>> {
        self.discovered_at
    }

    /// Payload layout.
    #[must_use]
    pub const fn layout(&self) -> FileLayout {
        self.layout
    }

    /// Retained file entries in declaration order.
    #[must_use]
    pub fn files(&self) -> &[TorrentFileEntry] {
        &self.files
    }

    /// Declared number of files before capping or padding removal.
    #[must_use]
    pub const fn file_count(&self) -> usize {
        self.file_count
    }

    /// Whether the torrent is private.
    #[must_use]
    pub const fn is_private(&self) -> bool {
        self.private
    }

    /// Provenance tag shared by every record of a run.
    #[must_use]
    pub fn source_label(&self) -> &str {
        &self.source_label
    }

    pub(crate) const fn set_total_size(&mut self, total_size: i64) {
        self.total_size = total_size;
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub(crate) const fn files_mut(&mut self) -> &mut Vec<TorrentFileEntry> {
        &mut self.files
    }
}
