//! The seam between the ingestion driver and concrete destinations.

use async_trait::async_trait;
use magbridge_core::{InfoHash, TorrentRecord};

use crate::error::{SinkError, SinkResult};

/// A destination that consumes each sanitised record exactly once.
///
/// `accept` may buffer; whatever it reports in [`SinkProgress`] is final.
/// `finish` flushes anything pending and closes outputs, and is also the
/// path taken on interruption.
#[async_trait]
pub trait RecordSink: Send {
    /// Short name for logs and summaries.
    fn name(&self) -> &'static str;

    /// Hand one record to the sink.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] only when the destination is unusable and the
    /// run must stop. Batches that fail for other reasons are reported in
    /// [`SinkProgress::failed`].
    async fn accept(&mut self, record: TorrentRecord) -> SinkResult<SinkProgress>;

    /// Flush pending work and close the destination.
    ///
    /// # Errors
    ///
    /// Same contract as [`RecordSink::accept`].
    async fn finish(&mut self) -> SinkResult<SinkProgress>;
}

/// What became durable (or definitively failed) during one sink call.
#[derive(Debug, Default)]
pub struct SinkProgress {
    /// Records written.
    pub committed: usize,
    /// Batches that exhausted their retries.
    pub failed: Vec<FailedBatch>,
}

impl SinkProgress {
    /// Progress for `count` written records and no failures.
    #[must_use]
    pub const fn committed(count: usize) -> Self {
        Self {
            committed: count,
            failed: Vec::new(),
        }
    }

    /// Records lost to failed batches.
    #[must_use]
    pub fn failed_records(&self) -> usize {
        self.failed.iter().map(|batch| batch.infohashes.len()).sum()
    }

    /// Fold `other` into `self`.
    pub fn absorb(&mut self, other: Self) {
        self.committed += other.committed;
        self.failed.extend(other.failed);
    }
}

/// A batch that was rolled back after its final attempt.
#[derive(Debug)]
pub struct FailedBatch {
    /// Every record of the batch, in arrival order. None of them committed.
    pub infohashes: Vec<InfoHash>,
    /// Attempts made.
    pub attempts: u32,
    /// Error from the last attempt.
    pub error: SinkError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absorb_accumulates_commits_and_failures() {
        let mut total = SinkProgress::committed(3);
        total.absorb(SinkProgress {
            committed: 2,
            failed: vec![FailedBatch {
                infohashes: vec![InfoHash::v1_of(b"a"), InfoHash::v1_of(b"b")],
                attempts: 3,
                error: SinkError::Database {
                    operation: "insert torrents",
                    source: sqlx::Error::RowNotFound,
                },
            }],
        });
        assert_eq!(total.committed, 5);
        assert_eq!(total.failed_records(), 2);
    }
}
