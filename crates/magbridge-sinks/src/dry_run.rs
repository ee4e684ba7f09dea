//! A sink that prepares every write and performs none.

use async_trait::async_trait;
use magbridge_config::{DatabaseSinkConfig, PaddingMode};
use magbridge_core::TorrentRecord;
use tracing::{debug, info};

use crate::database::file_rows;
use crate::error::{SinkError, SinkResult};
use crate::json::ImportItem;
use crate::sink::{RecordSink, SinkProgress};

#[derive(Debug, Clone, Copy)]
enum Rehearsal {
    Json,
    Database {
        padding: PaddingMode,
        file_limit: Option<usize>,
    },
}

/// Stands in for the configured sink when the run only validates input.
///
/// JSON runs serialise each record exactly as the real sink would, so
/// encoding problems still surface; database runs build the file rows.
/// Records are counted as committed so the summary shows what a real run
/// would have written.
#[derive(Debug)]
pub struct DryRunSink {
    rehearsal: Rehearsal,
    accepted: usize,
    json_bytes: usize,
    file_rows: usize,
}

impl DryRunSink {
    /// Dry run of the JSON sink.
    #[must_use]
    pub const fn json() -> Self {
        Self::with(Rehearsal::Json)
    }

    /// Dry run of the database sink described by `config`.
    #[must_use]
    pub const fn database(config: &DatabaseSinkConfig) -> Self {
        let file_limit = if config.files.enabled {
            Some(config.files.limit)
        } else {
            None
        };
        Self::with(Rehearsal::Database {
            padding: config.padding,
            file_limit,
        })
    }

    const fn with(rehearsal: Rehearsal) -> Self {
        Self {
            rehearsal,
            accepted: 0,
            json_bytes: 0,
            file_rows: 0,
        }
    }

    /// Records accepted so far.
    #[must_use]
    pub const fn accepted(&self) -> usize {
        self.accepted
    }

    const fn replaces(&self) -> &'static str {
        match self.rehearsal {
            Rehearsal::Json => "json",
            Rehearsal::Database { .. } => "database",
        }
    }
}

#[async_trait]
impl RecordSink for DryRunSink {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    async fn accept(&mut self, record: TorrentRecord) -> SinkResult<SinkProgress> {
        match self.rehearsal {
            Rehearsal::Json => {
                let encoded = serde_json::to_vec(&ImportItem::from(&record))
                    .map_err(|source| SinkError::Serialize { source })?;
                self.json_bytes += encoded.len();
            }
            Rehearsal::Database {
                padding,
                file_limit: Some(limit),
            } => self.file_rows += file_rows(&record, padding, limit).len(),
            Rehearsal::Database { .. } => {}
        }
        debug!(infohash = %record.infohash(), name = record.name(), "dry run: record not written");
        self.accepted += 1;
        Ok(SinkProgress::committed(1))
    }

    async fn finish(&mut self) -> SinkResult<SinkProgress> {
        info!(
            sink = self.replaces(),
            records = self.accepted,
            json_bytes = self.json_bytes,
            file_rows = self.file_rows,
            "dry run complete; nothing written"
        );
        Ok(SinkProgress::default())
    }
}
