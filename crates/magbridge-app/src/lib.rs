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

//! Ingestion driver and process wiring for magbridge.
//!
//! Layout: `driver.rs` (source to sanitizer to sink loop), `summary.rs` (run
//! counters and exit status), `shutdown.rs` (operator interruption),
//! `bootstrap.rs` (config to source and sink), `cli.rs` (argument parsing and
//! process exit), `error.rs` (`AppError`).

/// Building sources and sinks from a validated configuration.
pub mod bootstrap;
/// Command-line surface of the `magbridge` binary.
pub mod cli;
/// The pull loop that moves records from a source to a sink.
pub mod driver;
pub mod error;
/// Operator interruption.
pub mod shutdown;
/// End-of-run counters.
pub mod summary;

pub use bootstrap::{open_sink, open_source, run_ingest};
pub use driver::IngestionDriver;
pub use error::{AppError, AppResult};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use summary::RunSummary;
