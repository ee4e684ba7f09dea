use magbridge_config::{IngestConfig, SinkConfig, SourceConfig};
use magbridge_core::RecordSanitizer;
use magbridge_sinks::{DatabaseSink, DryRunSink, JsonStreamSink, RecordSink};
use magbridge_sources::{
    SourceReader, SqliteOptions, SqliteSourceReader, TorrentDirOptions, TorrentFileSourceReader,
};
use tracing::info;

use crate::driver::IngestionDriver;
use crate::error::{AppError, AppResult};
use crate::shutdown::ShutdownSignal;
use crate::summary::RunSummary;

/// Open the configured source, running its up-front checks.
///
/// # Errors
///
/// Returns [`AppError::Source`] when the source is missing or fails its
/// schema check.
pub async fn open_source(config: &IngestConfig) -> AppResult<Box<dyn SourceReader>> {
    let label = config.source_label.clone();
    match &config.source {
        SourceConfig::Sqlite { path, load_files } => {
            let reader = SqliteSourceReader::open(SqliteOptions::new(path, *load_files, label))
                .await
                .map_err(|err| AppError::reader("source.open_sqlite", err))?;
            Ok(Box::new(reader))
        }
        SourceConfig::TorrentDir {
            root,
            recursive,
            max_files_per_torrent,
        } => {
            let reader = TorrentFileSourceReader::open(TorrentDirOptions {
                root: root.clone(),
                recursive: *recursive,
                max_files_per_torrent: *max_files_per_torrent,
                source_label: label,
            })
            .await
            .map_err(|err| AppError::reader("source.open_torrent_dir", err))?;
            Ok(Box::new(reader))
        }
    }
}

/// Build the configured sink, or a [`DryRunSink`] in its place.
///
/// # Errors
///
/// Returns [`AppError::Sink`] when the destination database cannot be reached.
pub async fn open_sink(config: &IngestConfig) -> AppResult<Box<dyn RecordSink>> {
    match &config.sink {
        SinkConfig::Json(_) if config.dry_run => Ok(Box::new(DryRunSink::json())),
        SinkConfig::Database(database) if config.dry_run => {
            Ok(Box::new(DryRunSink::database(database)))
        }
        SinkConfig::Json(json) => Ok(Box::new(JsonStreamSink::new(json.clone()))),
        SinkConfig::Database(database) => {
            let sink = DatabaseSink::connect(database.clone(), &config.source_label)
                .await
                .map_err(|err| AppError::sink("sink.connect", err))?;
            Ok(Box::new(sink))
        }
    }
}

/// Run one ingest end to end.
///
/// The source is opened before the sink so a missing source never touches
/// the destination.
///
/// # Errors
///
/// Returns [`AppError`] when the source or sink cannot be opened or fails
/// fatally during the run.
pub async fn run_ingest(config: IngestConfig, shutdown: ShutdownSignal) -> AppResult<RunSummary> {
    info!(
        source_label = %config.source_label,
        negative_size = %config.sanitizer.negative_size,
        padding = config.sanitizer.padding.as_str(),
        dry_run = config.dry_run,
        "starting ingest"
    );
    let source = open_source(&config).await?;
    let sink = open_sink(&config).await?;
    IngestionDriver::new(source, RecordSanitizer::new(config.sanitizer), sink, shutdown)
        .run()
        .await
}
