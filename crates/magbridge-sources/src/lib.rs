#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! Source readers producing canonical torrent records one at a time.
//! Layout: reader.rs (trait + events), sqlite.rs (magnetico crawl databases),
//! torrent_dir.rs (`.torrent` directory walks), error.rs (fatal and per-record errors).

pub mod error;
pub mod reader;
pub mod sqlite;
pub mod torrent_dir;

pub use error::{MalformedRecord, SourceError, SourceResult};
pub use reader::{SourceEvent, SourceReader};
pub use sqlite::{SqliteOptions, SqliteSourceReader};
pub use torrent_dir::{TorrentDirOptions, TorrentFileSourceReader};
