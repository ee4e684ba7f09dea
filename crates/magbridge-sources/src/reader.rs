//! The pull interface every source implements.

use async_trait::async_trait;
use magbridge_core::TorrentRecord;

use crate::error::{MalformedRecord, SourceResult};

/// One item pulled from a source.
#[derive(Debug)]
pub enum SourceEvent {
    /// A decoded record.
    Record(TorrentRecord),
    /// An item that failed to decode; the source remains usable.
    Malformed(MalformedRecord),
}

/// Lazy, forward-only sequence of records.
///
/// Implementations hold at most one page of pending items. Re-opening a
/// source restarts it from the beginning.
#[async_trait]
pub trait SourceReader: Send {
    /// Provenance tag attached to every record.
    fn label(&self) -> &str;

    /// Pull the next item, or `None` once the source is exhausted.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::SourceError`] only for failures that make the rest
    /// of the source unreachable.
    async fn next_event(&mut self) -> SourceResult<Option<SourceEvent>>;
}
