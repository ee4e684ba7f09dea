//! Extraction of canonical records from raw `.torrent` bytes.
//!
//! # Design
//!
//! - The infohash is computed over the exact byte span of the `info` value as it
//!   appeared in the input, never over a re-encoding.
//! - v1 and hybrid torrents hash with SHA-1; pure v2 torrents (`meta version` 2
//!   without `pieces`) hash with SHA-256 and list files through `file tree`.
//! - The declared file count and total size are computed over the whole list;
//!   `max_files` only limits how many entries are retained.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::bencode::{self, Dict, Node, ValueKind};
use crate::error::MetainfoError;
use crate::infohash::InfoHash;
use crate::record::{FileLayout, TorrentFileEntry, TorrentRecord};
use crate::text::{decode_text, is_padding_path};

/// Caller-supplied knobs for metainfo extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetainfoOptions {
    /// Provenance tag attached to the resulting record.
    pub source_label: String,
    /// Maximum number of file entries retained per torrent.
    pub max_files: Option<usize>,
}

impl Default for MetainfoOptions {
    fn default() -> Self {
        Self {
            source_label: ".torrent".to_string(),
            max_files: None,
        }
    }
}

/// Decode a `.torrent` buffer into a canonical record.
///
/// # Errors
///
/// Returns [`MetainfoError`] when the buffer is not a single bencoded
/// dictionary, when `info` or `info.name` is missing, or when a field has a
/// type or value that cannot be narrowed.
pub fn parse_torrent(
    bytes: &[u8],
    options: &MetainfoOptions,
) -> Result<TorrentRecord, MetainfoError> {
    let root = bencode::decode(bytes)?;
    let root_dict = expect_dict(&root, "root")?;
    let info = root_dict
        .get(b"info")
        .ok_or(MetainfoError::MissingField { field: "info" })?;
    let info_dict = expect_dict(info, "info")?;

    let infohash = if uses_v2_hash(info_dict)? {
        InfoHash::v2_of(info.raw())
    } else {
        InfoHash::v1_of(info.raw())
    };

    let name_node = info_dict
        .get(b"name.utf-8")
        .or_else(|| info_dict.get(b"name"))
        .ok_or(MetainfoError::MissingField { field: "info.name" })?;
    let name = decode_text(expect_bytes(name_node, "info.name")?);
    if name.text.trim().is_empty() {
        return Err(MetainfoError::InvalidValue {
            field: "info.name",
            reason: "name is empty",
        });
    }
    if name.repaired {
        debug!(
            infohash = %infohash,
            encoding = name.encoding,
            "torrent name decoded with fallback encoding"
        );
    }

    let listing = extract_files(info_dict, &name.text, options.max_files)?;

    let discovered_at = root_dict
        .get(b"creation date")
        .and_then(Node::as_int)
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
    let private = info_dict.get(b"private").and_then(Node::as_int) == Some(1);

    let label = options.source_label.clone();
    Ok(TorrentRecord::new(infohash, name.text, listing.total_size, label)
        .with_name_repaired(name.repaired)
        .with_discovered_at(discovered_at)
        .with_private(private)
        .with_files(listing.layout, listing.files, listing.count))
}

struct FileListing {
    layout: FileLayout,
    files: Vec<TorrentFileEntry>,
    count: usize,
    total_size: i64,
}

impl FileListing {
    fn new(layout: FileLayout) -> Self {
        Self {
            layout,
            files: Vec::new(),
            count: 0,
            total_size: 0,
        }
    }

    fn push(
        &mut self,
        path: String,
        size: i64,
        attr_padding: bool,
        max_files: Option<usize>,
        field: &'static str,
    ) -> Result<(), MetainfoError> {
        self.total_size = self
            .total_size
            .checked_add(size)
            .ok_or(MetainfoError::InvalidValue {
                field,
                reason: "total size overflows",
            })?;
        let index = self.count;
        self.count += 1;
        if max_files.is_none_or(|limit| self.files.len() < limit) {
            let padding = attr_padding || is_padding_path(&path);
            self.files
                .push(TorrentFileEntry::new(index, path, size).with_padding(padding));
        }
        Ok(())
    }
}

fn uses_v2_hash(info: &Dict<'_>) -> Result<bool, MetainfoError> {
    if info.contains_key(b"pieces") {
        return Ok(false);
    }
    match info.get(b"meta version") {
        Some(node) => Ok(expect_int(node, "info.meta version")? == 2),
        None => Ok(false),
    }
}

fn extract_files(
    info: &Dict<'_>,
    name: &str,
    max_files: Option<usize>,
) -> Result<FileListing, MetainfoError> {
    if let Some(files) = info.get(b"files") {
        let mut listing = FileListing::new(FileLayout::Multi);
        for entry in expect_list(files, "info.files")? {
            let entry = expect_dict(entry, "info.files")?;
            let length = entry
                .get(b"length")
                .ok_or(MetainfoError::MissingField {
                    field: "info.files.length",
                })?;
            let size = expect_int(length, "info.files.length")?;
            let path = file_path(entry)?;
            listing.push(path, size, has_padding_attr(entry), max_files, "info.files.length")?;
        }
        return Ok(listing);
    }

    if let Some(length) = info.get(b"length") {
        let size = expect_int(length, "info.length")?;
        let mut listing = FileListing::new(FileLayout::Single);
        listing.push(name.to_string(), size, has_padding_attr(info), max_files, "info.length")?;
        return Ok(listing);
    }

    if let Some(tree) = info.get(b"file tree") {
        let mut listing = FileListing::new(FileLayout::Multi);
        let mut prefix = Vec::new();
        walk_file_tree(expect_dict(tree, "info.file tree")?, &mut prefix, &mut listing, max_files)?;
        if listing.count == 1 {
            listing.layout = FileLayout::Single;
        }
        return Ok(listing);
    }

    Err(MetainfoError::MissingField {
        field: "info.length",
    })
}

fn file_path(entry: &Dict<'_>) -> Result<String, MetainfoError> {
    let node = entry
        .get(b"path.utf-8")
        .or_else(|| entry.get(b"path"))
        .ok_or(MetainfoError::MissingField {
            field: "info.files.path",
        })?;
    let mut parts = Vec::new();
    for component in expect_list(node, "info.files.path")? {
        parts.push(decode_text(expect_bytes(component, "info.files.path")?).text);
    }
    if parts.is_empty() {
        return Err(MetainfoError::InvalidValue {
            field: "info.files.path",
            reason: "path has no components",
        });
    }
    Ok(parts.join("/"))
}

fn walk_file_tree(
    tree: &Dict<'_>,
    prefix: &mut Vec<String>,
    listing: &mut FileListing,
    max_files: Option<usize>,
) -> Result<(), MetainfoError> {
    for (key, node) in tree.iter() {
        let child = expect_dict(node, "info.file tree")?;
        if key.is_empty() {
            let length = child.get(b"length").ok_or(MetainfoError::MissingField {
                field: "info.file tree.length",
            })?;
            let size = expect_int(length, "info.file tree.length")?;
            listing.push(
                prefix.join("/"),
                size,
                has_padding_attr(child),
                max_files,
                "info.file tree.length",
            )?;
        } else {
            prefix.push(decode_text(key).text);
            walk_file_tree(child, prefix, listing, max_files)?;
            prefix.pop();
        }
    }
    Ok(())
}

fn has_padding_attr(entry: &Dict<'_>) -> bool {
    entry
        .get(b"attr")
        .and_then(Node::as_bytes)
        .is_some_and(|attr| attr.contains(&b'p'))
}

fn type_error(node: &Node<'_>, field: &'static str, expected: ValueKind) -> MetainfoError {
    MetainfoError::UnexpectedType {
        field,
        expected,
        found: node.kind(),
        offset: node.offset(),
    }
}

fn expect_dict<'n, 'a>(
    node: &'n Node<'a>,
    field: &'static str,
) -> Result<&'n Dict<'a>, MetainfoError> {
    node.as_dict()
        .ok_or_else(|| type_error(node, field, ValueKind::Dict))
}

fn expect_list<'n, 'a>(
    node: &'n Node<'a>,
    field: &'static str,
) -> Result<&'n [Node<'a>], MetainfoError> {
    node.as_list()
        .ok_or_else(|| type_error(node, field, ValueKind::List))
}

fn expect_bytes<'a>(node: &Node<'a>, field: &'static str) -> Result<&'a [u8], MetainfoError> {
    node.as_bytes()
        .ok_or_else(|| type_error(node, field, ValueKind::Bytes))
}

fn expect_int(node: &Node<'_>, field: &'static str) -> Result<i64, MetainfoError> {
    node.as_int()
        .ok_or_else(|| type_error(node, field, ValueKind::Int))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BencodeError;
    use magbridge_test_support::fixtures::{FixtureFile, TorrentFixture};

    #[test]
    fn single_file_torrent_hashes_the_raw_info_span() -> Result<(), MetainfoError> {
        let info: &[u8] =
            b"d6:lengthi700000000e4:name10:sample.iso12:piece lengthi262144e6:pieces20:AAAAAAAAAAAAAAAAAAAAe";
        let torrent = [b"d13:creation datei1700000000e4:info".as_slice(), info, b"e"].concat();

        let record = parse_torrent(&torrent, &MetainfoOptions::default())?;
        assert_eq!(record.infohash(), &InfoHash::v1_of(info));
        assert_eq!(record.name(), "sample.iso");
        assert_eq!(record.total_size(), 700_000_000);
        assert_eq!(record.layout(), FileLayout::Single);
        assert_eq!(record.files().len(), 1);
        assert_eq!(record.files()[0].path, "sample.iso");
        assert_eq!(record.source_label(), ".torrent");
        assert_eq!(
            record.discovered_at().map(|at| at.timestamp()),
            Some(1_700_000_000)
        );
        Ok(())
    }

    #[test]
    fn unsorted_info_keys_keep_their_hash() -> Result<(), MetainfoError> {
        let info: &[u8] = b"d4:name1:x6:lengthi1e6:pieces0:e";
        let torrent = [b"d4:info".as_slice(), info, b"e"].concat();
        let record = parse_torrent(&torrent, &MetainfoOptions::default())?;
        assert_eq!(record.infohash(), &InfoHash::v1_of(info));
        Ok(())
    }

    #[test]
    fn multi_file_total_ignores_cap_and_marks_padding() -> Result<(), MetainfoError> {
        let bytes = TorrentFixture::multi(
            "album",
            vec![
                FixtureFile::new("disc1/01.flac", 100),
                FixtureFile::new(".pad/28", 28).padding_attr(),
                FixtureFile::new("_____padding_file_1_", 12),
                FixtureFile::new("disc1/02.flac", 60),
            ],
        )
        .to_bytes();

        let options = MetainfoOptions {
            source_label: "archive".into(),
            max_files: Some(3),
        };
        let record = parse_torrent(&bytes, &options)?;
        assert_eq!(record.layout(), FileLayout::Multi);
        assert_eq!(record.total_size(), 200);
        assert_eq!(record.file_count(), 4);
        let flags: Vec<_> = record.files().iter().map(|f| (f.index, f.padding)).collect();
        assert_eq!(flags, vec![(0, false), (1, true), (2, true)]);
        assert_eq!(record.files()[0].path, "disc1/01.flac");
        Ok(())
    }

    #[test]
    fn v2_only_torrent_uses_sha256_and_file_tree() -> Result<(), MetainfoError> {
        let fixture = TorrentFixture::multi(
            "tree",
            vec![FixtureFile::new("a/one.bin", 5), FixtureFile::new("two.bin", 7)],
        )
        .v2_only();
        let record = parse_torrent(&fixture.to_bytes(), &MetainfoOptions::default())?;
        assert_eq!(record.infohash(), &InfoHash::v2_of(&fixture.info_bytes()));
        assert_eq!(record.total_size(), 12);
        let paths: Vec<_> = record.files().iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a/one.bin", "two.bin"]);
        Ok(())
    }

    #[test]
    fn private_flag_and_utf8_name_override() -> Result<(), MetainfoError> {
        let bytes = TorrentFixture::single("fallback", 1)
            .private(true)
            .utf8_name("préféré")
            .to_bytes();
        let record = parse_torrent(&bytes, &MetainfoOptions::default())?;
        assert!(record.is_private());
        assert_eq!(record.name(), "préféré");
        assert!(!record.name_repaired());
        Ok(())
    }

    #[test]
    fn legacy_encoded_name_is_repaired() -> Result<(), MetainfoError> {
        let bytes = TorrentFixture::single("placeholder", 1)
            .raw_name(vec![0x83, 0x65, 0x83, 0x58, 0x83, 0x67])
            .to_bytes();
        let record = parse_torrent(&bytes, &MetainfoOptions::default())?;
        assert_eq!(record.name(), "テスト");
        assert!(record.name_repaired());
        Ok(())
    }

    #[test]
    fn structural_failures_are_typed() {
        assert!(matches!(
            parse_torrent(b"le", &MetainfoOptions::default()),
            Err(MetainfoError::UnexpectedType {
                field: "root",
                expected: ValueKind::Dict,
                found: ValueKind::List,
                offset: 0,
            })
        ));
        assert_eq!(
            parse_torrent(b"d3:fooi1ee", &MetainfoOptions::default()),
            Err(MetainfoError::MissingField { field: "info" })
        );
        assert!(matches!(
            parse_torrent(b"d4:infoi1ee", &MetainfoOptions::default()),
            Err(MetainfoError::UnexpectedType { field: "info", .. })
        ));
        assert_eq!(
            parse_torrent(b"d4:infod4:name1:xee", &MetainfoOptions::default()),
            Err(MetainfoError::MissingField {
                field: "info.length"
            })
        );
        assert_eq!(
            parse_torrent(b"d4:infod6:lengthi1e4:name0:ee", &MetainfoOptions::default()),
            Err(MetainfoError::InvalidValue {
                field: "info.name",
                reason: "name is empty"
            })
        );
    }

    #[test]
    fn truncated_buffer_surfaces_decoder_error() {
        let err = parse_torrent(b"d4:infod6:lengthi1e", &MetainfoOptions::default())
            .expect_err("truncated input must fail");
        assert!(matches!(
            err,
            MetainfoError::Encoding {
                source: BencodeError::Malformed { .. }
            }
        ));
        assert!(err.offset().is_some());
    }

    #[test]
    fn summed_sizes_that_overflow_are_rejected() {
        let bytes = TorrentFixture::multi(
            "huge",
            vec![
                FixtureFile::new("a", i64::MAX),
                FixtureFile::new("b", 1),
            ],
        )
        .to_bytes();
        assert_eq!(
            parse_torrent(&bytes, &MetainfoOptions::default()),
            Err(MetainfoError::InvalidValue {
                field: "info.files.length",
                reason: "total size overflows"
            })
        );
    }
}
