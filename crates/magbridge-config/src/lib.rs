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

//! Run configuration for magbridge ingests.
//!
//! Layout: `model.rs` (raw settings bag and typed config), `validate.rs`
//! (settings to config), `loader.rs` (JSON settings files), `defaults.rs`
//! (default values and limits), `error.rs` (`ConfigError`).

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::load_settings_file;
pub use magbridge_core::{NegativeSizePolicy, PaddingMode, SanitizerConfig};
pub use model::{
    ConnectionSettings, DatabaseSinkConfig, FileRows, IngestConfig, IngestSettings, JsonLayout,
    JsonSinkConfig, JsonTarget, SinkConfig, SinkKind, SourceConfig, SourceKind,
};
