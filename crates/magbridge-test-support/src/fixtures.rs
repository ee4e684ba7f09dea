//! Builders for bencoded values and `.torrent` files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Minimal bencode value used to author fixtures.
///
/// Dictionary entries are written in the order given, so fixtures can produce
/// non-canonical key orders on purpose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bencode {
    /// Length-prefixed byte string.
    Bytes(Vec<u8>),
    /// Integer.
    Int(i64),
    /// List.
    List(Vec<Bencode>),
    /// Dictionary in authoring order.
    Dict(Vec<(Vec<u8>, Bencode)>),
}

impl Bencode {
    /// Byte string from anything byte-like.
    pub fn bytes(value: impl AsRef<[u8]>) -> Self {
        Self::Bytes(value.as_ref().to_vec())
    }

    /// Dictionary from `(key, value)` pairs.
    pub fn dict<K: AsRef<[u8]>>(entries: impl IntoIterator<Item = (K, Self)>) -> Self {
        Self::Dict(
            entries
                .into_iter()
                .map(|(key, value)| (key.as_ref().to_vec(), value))
                .collect(),
        )
    }

    /// Serialise to bencode bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Self::Bytes(bytes) => write_bytes(out, bytes),
            Self::Int(value) => {
                out.push(b'i');
                out.extend_from_slice(value.to_string().as_bytes());
                out.push(b'e');
            }
            Self::List(items) => {
                out.push(b'l');
                for item in items {
                    item.encode_into(out);
                }
                out.push(b'e');
            }
            Self::Dict(entries) => {
                out.push(b'd');
                for (key, value) in entries {
                    write_bytes(out, key);
                    value.encode_into(out);
                }
                out.push(b'e');
            }
        }
    }
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(bytes.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(bytes);
}

/// One file of a multi-file fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureFile {
    path: Vec<String>,
    length: i64,
    padding_attr: bool,
}

impl FixtureFile {
    /// File at a `/`-separated path.
    pub fn new(path: &str, length: i64) -> Self {
        Self {
            path: path.split('/').map(str::to_string).collect(),
            length,
            padding_attr: false,
        }
    }

    /// Flag the entry with the BEP 47 `attr` value `p`.
    #[must_use]
    pub fn padding_attr(mut self) -> Self {
        self.padding_attr = true;
        self
    }

    fn properties(&self) -> Vec<(Vec<u8>, Bencode)> {
        let mut entries = Vec::new();
        if self.padding_attr {
            entries.push((b"attr".to_vec(), Bencode::bytes("p")));
        }
        entries.push((b"length".to_vec(), Bencode::Int(self.length)));
        entries
    }
}

#[derive(Debug, Clone)]
enum Payload {
    Single(i64),
    Multi(Vec<FixtureFile>),
}

/// Builder for `.torrent` byte buffers.
#[derive(Debug, Clone)]
pub struct TorrentFixture {
    name: Vec<u8>,
    utf8_name: Option<String>,
    payload: Payload,
    creation_date: Option<i64>,
    private: bool,
    v2_only: bool,
}

impl TorrentFixture {
    /// Single-file torrent.
    pub fn single(name: &str, length: i64) -> Self {
        Self::with_payload(name, Payload::Single(length))
    }

    /// Multi-file torrent.
    pub fn multi(name: &str, files: Vec<FixtureFile>) -> Self {
        Self::with_payload(name, Payload::Multi(files))
    }

    fn with_payload(name: &str, payload: Payload) -> Self {
        Self {
            name: name.as_bytes().to_vec(),
            utf8_name: None,
            payload,
            creation_date: None,
            private: false,
            v2_only: false,
        }
    }

    /// Replace `info.name` with arbitrary bytes.
    #[must_use]
    pub fn raw_name(mut self, name: Vec<u8>) -> Self {
        self.name = name;
        self
    }

    /// Add an `info.name.utf-8` override.
    #[must_use]
    pub fn utf8_name(mut self, name: &str) -> Self {
        self.utf8_name = Some(name.to_string());
        self
    }

    /// Set the top-level `creation date`.
    #[must_use]
    pub const fn creation_date(mut self, seconds: i64) -> Self {
        self.creation_date = Some(seconds);
        self
    }

    /// Set `info.private`.
    #[must_use]
    pub const fn private(mut self, private: bool) -> Self {
        self.private = private;
        self
    }

    /// Emit a pure v2 torrent (`meta version` 2, `file tree`, no `pieces`).
    #[must_use]
    pub const fn v2_only(mut self) -> Self {
        self.v2_only = true;
        self
    }

    /// The `info` dictionary.
    #[must_use]
    pub fn info(&self) -> Bencode {
        let mut entries: Vec<(Vec<u8>, Bencode)> = Vec::new();
        if self.v2_only {
            entries.push((b"file tree".to_vec(), self.file_tree()));
            entries.push((b"meta version".to_vec(), Bencode::Int(2)));
        } else {
            match &self.payload {
                Payload::Single(length) => {
                    entries.push((b"length".to_vec(), Bencode::Int(*length)));
                }
                Payload::Multi(files) => {
                    let list = files
                        .iter()
                        .map(|file| {
                            let mut props = file.properties();
                            props.push((
                                b"path".to_vec(),
                                Bencode::List(file.path.iter().map(Bencode::bytes).collect()),
                            ));
                            Bencode::Dict(props)
                        })
                        .collect();
                    entries.push((b"files".to_vec(), Bencode::List(list)));
                }
            }
        }
        entries.push((b"name".to_vec(), Bencode::Bytes(self.name.clone())));
        if let Some(name) = &self.utf8_name {
            entries.push((b"name.utf-8".to_vec(), Bencode::bytes(name)));
        }
        entries.push((b"piece length".to_vec(), Bencode::Int(262_144)));
        if !self.v2_only {
            entries.push((b"pieces".to_vec(), Bencode::Bytes(vec![0xAB; 20])));
        }
        if self.private {
            entries.push((b"private".to_vec(), Bencode::Int(1)));
        }
        Bencode::Dict(entries)
    }

    fn file_tree(&self) -> Bencode {
        let files = match &self.payload {
            Payload::Single(length) => vec![FixtureFile {
                path: vec![String::from_utf8_lossy(&self.name).into_owned()],
                length: *length,
                padding_attr: false,
            }],
            Payload::Multi(files) => files.clone(),
        };
        let mut root: Vec<(Vec<u8>, Bencode)> = Vec::new();
        for file in &files {
            insert_tree_path(&mut root, &file.path, file.properties());
        }
        Bencode::Dict(root)
    }

    /// Encoded `info` dictionary, the exact bytes the infohash covers.
    #[must_use]
    pub fn info_bytes(&self) -> Vec<u8> {
        self.info().encode()
    }

    /// Encoded torrent.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut entries = vec![(
            b"announce".to_vec(),
            Bencode::bytes("udp://tracker.invalid:1337"),
        )];
        if let Some(date) = self.creation_date {
            entries.push((b"creation date".to_vec(), Bencode::Int(date)));
        }
        entries.push((b"info".to_vec(), self.info()));
        Bencode::Dict(entries).encode()
    }

    /// Write the encoded torrent to `dir/file_name`.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from writing the file.
    pub fn write_to(&self, dir: &Path, file_name: &str) -> io::Result<PathBuf> {
        let path = dir.join(file_name);
        fs::write(&path, self.to_bytes())?;
        Ok(path)
    }
}

fn insert_tree_path(
    level: &mut Vec<(Vec<u8>, Bencode)>,
    path: &[String],
    leaf: Vec<(Vec<u8>, Bencode)>,
) {
    let Some((head, rest)) = path.split_first() else {
        level.push((Vec::new(), Bencode::Dict(leaf)));
        return;
    };
    let key = head.as_bytes().to_vec();
    let position = level.iter().position(|(existing, _)| *existing == key);
    let index = position.unwrap_or_else(|| {
        level.push((key, Bencode::Dict(Vec::new())));
        level.len() - 1
    });
    if let Bencode::Dict(children) = &mut level[index].1 {
        insert_tree_path(children, rest, leaf);
    }
}

/// Write raw bytes under `dir/file_name`; used for corrupt fixtures.
///
/// # Errors
///
/// Returns any I/O error from writing the file.
pub fn write_raw(dir: &Path, file_name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
    let path = dir.join(file_name);
    fs::write(&path, bytes)?;
    Ok(path)
}
