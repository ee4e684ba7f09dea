use magbridge_sinks::SinkProgress;
use serde::Serialize;
use tracing::{info, warn};

/// Counters for one ingestion run.
///
/// `seen` counts every source event, including malformed ones, so
/// `seen == sunk + dropped + rejected + malformed + failed_records` once the
/// sink has finished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Source events pulled.
    pub seen: usize,
    /// Records the sink reported as written.
    pub sunk: usize,
    /// Records removed by the `skip` negative-size policy.
    pub dropped: usize,
    /// Records removed by the `reject` negative-size policy.
    pub rejected: usize,
    /// Files or rows that could not be decoded.
    pub malformed: usize,
    /// Sink batches that exhausted their retries.
    pub failed_batches: usize,
    /// Records inside those batches.
    pub failed_records: usize,
    /// The run stopped early on operator request.
    pub interrupted: bool,
}

#[derive(Serialize)]
struct SummaryReport<'a> {
    #[serde(flatten)]
    summary: &'a RunSummary,
    errors: usize,
    exit_code: i32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    aborted: bool,
}

impl RunSummary {
    /// Per-record failures: malformed input, rejected records, and records
    /// lost to failed batches.
    #[must_use]
    pub const fn errors(&self) -> usize {
        self.malformed + self.rejected + self.failed_records
    }

    /// `0` for a clean run, `1` when anything was malformed, rejected, or
    /// failed to commit.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        if self.errors() > 0 || self.failed_batches > 0 {
            1
        } else {
            0
        }
    }

    /// Fold a sink report into the counters.
    pub fn record_progress(&mut self, progress: &SinkProgress) {
        self.sunk += progress.committed;
        self.failed_batches += progress.failed.len();
        self.failed_records += progress.failed_records();
    }

    /// JSON rendering with the derived `errors` and `exit_code` fields.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        self.report(self.exit_code(), false)
    }

    /// JSON rendering for a run that ended on a fatal error with `exit_code`.
    #[must_use]
    pub fn to_aborted_json(&self, exit_code: i32) -> serde_json::Value {
        self.report(exit_code, true)
    }

    fn report(&self, exit_code: i32, aborted: bool) -> serde_json::Value {
        serde_json::to_value(SummaryReport {
            summary: self,
            errors: self.errors(),
            exit_code,
            aborted,
        })
        .unwrap_or(serde_json::Value::Null)
    }

    /// Emit the summary as a single structured event.
    pub fn log(&self) {
        if self.exit_code() == 0 {
            info!(
                seen = self.seen,
                sunk = self.sunk,
                dropped = self.dropped,
                interrupted = self.interrupted,
                "ingest finished"
            );
        } else {
            warn!(
                seen = self.seen,
                sunk = self.sunk,
                dropped = self.dropped,
                rejected = self.rejected,
                malformed = self.malformed,
                failed_batches = self.failed_batches,
                failed_records = self.failed_records,
                interrupted = self.interrupted,
                "ingest finished with errors"
            );
        }
    }
}
