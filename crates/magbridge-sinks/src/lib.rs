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

//! Destinations for sanitised torrent records.
//!
//! Layout: `sink.rs` (`RecordSink` trait and progress reports), `json.rs`
//! (bitmagnet import JSON, optionally split), `database.rs` (batched Postgres
//! upserts), `dry_run.rs` (counts without writing), `error.rs` (`SinkError`).

pub mod database;
pub mod dry_run;
pub mod error;
pub mod json;
pub mod sink;

pub use database::DatabaseSink;
pub use dry_run::DryRunSink;
pub use error::{SinkError, SinkResult};
pub use json::{JsonStreamSink, part_path};
pub use sink::{FailedBatch, RecordSink, SinkProgress};
