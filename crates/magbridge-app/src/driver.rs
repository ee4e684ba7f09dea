use magbridge_core::{RecordSanitizer, Sanitized};
use magbridge_sinks::RecordSink;
use magbridge_sources::{SourceEvent, SourceReader};
use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult};
use crate::shutdown::ShutdownSignal;
use crate::summary::RunSummary;

const PROGRESS_EVERY: usize = 10_000;

/// Pulls one event at a time from a source, sanitises records, and hands
/// them to exactly one sink.
///
/// Per-record problems are counted and logged; only a failing source or an
/// unusable sink ends the run with an error. The sink is always finished,
/// including on interruption and on fatal errors, so pending batches are
/// committed and JSON arrays are closed.
pub struct IngestionDriver {
    source: Box<dyn SourceReader>,
    sanitizer: RecordSanitizer,
    sink: Box<dyn RecordSink>,
    shutdown: ShutdownSignal,
}

impl IngestionDriver {
    /// Wire a source, sanitizer, and sink together.
    #[must_use]
    pub fn new(
        source: Box<dyn SourceReader>,
        sanitizer: RecordSanitizer,
        sink: Box<dyn RecordSink>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            source,
            sanitizer,
            sink,
            shutdown,
        }
    }

    /// Drain the source into the sink.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Aborted`] wrapping the source or sink failure when
    /// the source fails mid-stream or the destination becomes unusable; the
    /// error carries the counts reached, including anything the sink
    /// committed while finishing.
    pub async fn run(mut self) -> AppResult<RunSummary> {
        let mut summary = RunSummary::default();
        info!(
            source = self.source.label(),
            sink = self.sink.name(),
            "ingest started"
        );

        let outcome = self.pump(&mut summary).await;
        let finished = self.sink.finish().await;

        let fatal = match (outcome, finished) {
            (Ok(()), Ok(progress)) => {
                summary.record_progress(&progress);
                None
            }
            (Ok(()), Err(err)) => Some(AppError::sink("sink.finish", err)),
            (Err(err), Ok(progress)) => {
                summary.record_progress(&progress);
                Some(err)
            }
            (Err(err), Err(sink_err)) => {
                error!(
                    error = %sink_err,
                    detail = ?sink_err,
                    "sink failed to finish after fatal error"
                );
                Some(err)
            }
        };
        summary.log();
        match fatal {
            None => Ok(summary),
            Some(err) => Err(AppError::aborted(summary, err)),
        }
    }

    async fn pump(&mut self, summary: &mut RunSummary) -> AppResult<()> {
        loop {
            if self.shutdown.is_triggered() {
                summary.interrupted = true;
                warn!(seen = summary.seen, "ingest interrupted; flushing sink");
                return Ok(());
            }
            let next = tokio::select! {
                biased;
                () = self.shutdown.wait() => {
                    summary.interrupted = true;
                    warn!(seen = summary.seen, "ingest interrupted; flushing sink");
                    return Ok(());
                }
                next = self.source.next_event() => next,
            };
            let event = match next {
                Ok(Some(event)) => event,
                Ok(None) => return Ok(()),
                Err(err) => {
                    error!(error = %err, detail = ?err, "source failed mid-stream");
                    return Err(AppError::reader("source.next_event", err));
                }
            };

            summary.seen += 1;
            if summary.seen % PROGRESS_EVERY == 0 {
                info!(seen = summary.seen, sunk = summary.sunk, "ingest progress");
            }
            match event {
                SourceEvent::Malformed(err) => {
                    summary.malformed += 1;
                    warn!(
                        origin = %err.origin(),
                        error = %err,
                        detail = ?err,
                        "skipping malformed input"
                    );
                }
                SourceEvent::Record(record) => match self.sanitizer.sanitize(record) {
                    Sanitized::Accepted(record) => {
                        debug!(infohash = %record.infohash(), "record accepted");
                        let progress = self
                            .sink
                            .accept(record)
                            .await
                            .map_err(|err| AppError::sink("sink.accept", err))?;
                        summary.record_progress(&progress);
                    }
                    Sanitized::Dropped { .. } => summary.dropped += 1,
                    Sanitized::Rejected { .. } => summary.rejected += 1,
                },
            }
        }
    }
}
