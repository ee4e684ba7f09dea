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

//! Torrent metadata decoding and normalisation shared by every magbridge source and sink.
//!
//! Layout: `bencode.rs` (order-preserving decoder), `metainfo.rs` (`.torrent` extraction),
//! `infohash.rs` (v1/v2 identifiers), `record.rs` (canonical record), `text.rs`
//! (encoding repair), `sanitize.rs` (per-record policies), `error.rs` (error types).

pub mod bencode;
pub mod error;
pub mod infohash;
pub mod metainfo;
pub mod record;
pub mod sanitize;
pub mod text;

pub use error::{BencodeError, InfoHashError, MetainfoError};
pub use infohash::InfoHash;
pub use metainfo::{MetainfoOptions, parse_torrent};
pub use record::{FileLayout, TorrentFileEntry, TorrentRecord};
pub use sanitize::{
    NegativeSizePolicy, PaddingMode, RecordSanitizer, Sanitized, SanitizerConfig, UnknownPolicy,
};
pub use text::{DecodedText, decode_text, is_padding_path, strip_control_chars};
