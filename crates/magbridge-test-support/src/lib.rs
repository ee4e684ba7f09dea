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

//! Shared test helpers used across integration suites.
//! Layout: fixtures.rs (bencode and `.torrent` builders), magnetico.rs (crawl database builder),
//! postgres.rs (disposable Postgres with the bitmagnet schema).

pub mod fixtures;
pub mod magnetico;
pub mod postgres;
