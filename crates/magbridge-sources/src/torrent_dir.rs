//! Reader for directory trees of `.torrent` files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use magbridge_core::{MetainfoOptions, parse_torrent};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{MalformedRecord, SourceError, SourceResult};
use crate::reader::{SourceEvent, SourceReader};

const TORRENT_EXTENSION: &str = "torrent";

/// Settings for [`TorrentFileSourceReader`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentDirOptions {
    /// Directory to walk.
    pub root: PathBuf,
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Maximum file entries retained per torrent.
    pub max_files_per_torrent: Option<usize>,
    /// Provenance tag for every record.
    pub source_label: String,
}

/// Walks a directory in file-name order and decodes each `.torrent` file.
///
/// Only one file's bytes are held in memory at a time. A file that fails to
/// read or decode is yielded as [`SourceEvent::Malformed`] and the walk continues.
pub struct TorrentFileSourceReader {
    label: String,
    metainfo: MetainfoOptions,
    walker: walkdir::IntoIter,
}

impl TorrentFileSourceReader {
    /// Validate the root directory and prepare the walk.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the root does not exist, is not a
    /// directory, or cannot be listed.
    pub async fn open(options: TorrentDirOptions) -> SourceResult<Self> {
        let root = options.root.as_path();
        let metadata = tokio::fs::metadata(root).await.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                SourceError::Unavailable {
                    path: root.to_path_buf(),
                    reason: "directory does not exist",
                }
            } else {
                SourceError::Io {
                    operation: "stat source directory",
                    path: root.to_path_buf(),
                    source,
                }
            }
        })?;
        if !metadata.is_dir() {
            return Err(SourceError::Unavailable {
                path: root.to_path_buf(),
                reason: "source path is not a directory",
            });
        }
        // Fail at open when the root itself cannot be listed.
        let _ = tokio::fs::read_dir(root)
            .await
            .map_err(|source| SourceError::Io {
                operation: "list source directory",
                path: root.to_path_buf(),
                source,
            })?;

        let max_depth = if options.recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(root)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter();

        info!(
            root = %root.display(),
            recursive = options.recursive,
            "walking torrent directory"
        );
        Ok(Self {
            label: options.source_label.clone(),
            metainfo: MetainfoOptions {
                source_label: options.source_label,
                max_files: options.max_files_per_torrent,
            },
            walker,
        })
    }
}

#[async_trait]
impl SourceReader for TorrentFileSourceReader {
    fn label(&self) -> &str {
        &self.label
    }

    async fn next_event(&mut self) -> SourceResult<Option<SourceEvent>> {
        loop {
            let entry = match self.walker.next() {
                None => return Ok(None),
                Some(Ok(entry)) => entry,
                Some(Err(source)) => {
                    let path = source.path().map(Path::to_path_buf);
                    return Ok(Some(SourceEvent::Malformed(MalformedRecord::Walk {
                        path,
                        source,
                    })));
                }
            };
            if entry.file_type().is_file() && has_torrent_extension(entry.path()) {
                return Ok(Some(decode_file(entry.into_path(), &self.metainfo).await));
            }
        }
    }
}

async fn decode_file(path: PathBuf, options: &MetainfoOptions) -> SourceEvent {
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(source) => return SourceEvent::Malformed(MalformedRecord::Unreadable { path, source }),
    };
    match parse_torrent(&bytes, options) {
        Ok(record) => {
            debug!(path = %path.display(), infohash = %record.infohash(), "decoded torrent file");
            SourceEvent::Record(record)
        }
        Err(source) => SourceEvent::Malformed(MalformedRecord::Torrent { path, source }),
    }
}

fn has_torrent_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(TORRENT_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_match_is_case_insensitive() {
        assert!(has_torrent_extension(Path::new("a/b.torrent")));
        assert!(has_torrent_extension(Path::new("B.TORRENT")));
        assert!(!has_torrent_extension(Path::new("b.torrent.part")));
        assert!(!has_torrent_extension(Path::new("torrent")));
    }
}
