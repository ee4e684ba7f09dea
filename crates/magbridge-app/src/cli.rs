use std::io::{self, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use magbridge_config::{
    IngestConfig, IngestSettings, JsonLayout, NegativeSizePolicy, PaddingMode, SinkKind,
    SourceKind, load_settings_file,
};
use magbridge_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging};
use tracing::{error, warn};

use crate::bootstrap::run_ingest;
use crate::error::{AppError, AppResult};
use crate::shutdown::Shutdown;

/// Ingest torrent metadata from a magnetico database or a `.torrent` tree
/// into bitmagnet.
#[derive(Debug, Parser)]
#[command(name = "magbridge", version, about)]
pub struct Cli {
    /// JSON settings file; command-line values override it.
    #[arg(long, global = true, env = "MAGBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter directive when `RUST_LOG` is unset.
    #[arg(long, global = true, env = "MAGBRIDGE_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,

    /// `pretty` or `json`.
    #[arg(long, global = true, env = "MAGBRIDGE_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(flatten)]
    policy: PolicyArgs,

    #[command(flatten)]
    sink: SinkArgs,

    #[command(subcommand)]
    source: Option<SourceCommand>,
}

#[derive(Debug, Subcommand)]
enum SourceCommand {
    /// Read a magnetico SQLite crawl database.
    #[command(alias = "magnetico")]
    Sqlite {
        /// Database file.
        path: PathBuf,
        /// Read the `files` table (implied by `--add-files`).
        #[arg(long)]
        load_files: bool,
    },
    /// Decode every `.torrent` file in a directory.
    #[command(alias = "torrent-dir")]
    Torrents {
        /// Directory to scan.
        path: PathBuf,
        /// Descend into subdirectories.
        #[arg(long, short = 'r')]
        recursive: bool,
        /// File entries kept per torrent.
        #[arg(long)]
        max_files: Option<usize>,
    },
}

#[derive(Debug, Args)]
struct PolicyArgs {
    /// What to do with negative sizes: `skip`, `zero`, or `reject`.
    #[arg(long, global = true, env = "MAGBRIDGE_NEGATIVE_SIZE")]
    negative_size: Option<NegativeSizePolicy>,

    /// Padding files in file lists: `exclude` or `include`.
    #[arg(long, global = true, env = "MAGBRIDGE_PADDING")]
    padding: Option<PaddingMode>,

    /// Provenance tag; defaults to `magnetico` or `.torrent`.
    #[arg(long, global = true, env = "MAGBRIDGE_SOURCE_LABEL")]
    source_label: Option<String>,

    /// Run the whole pipeline without writing anything.
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct SinkArgs {
    /// `json` or `database`.
    #[arg(long, global = true, env = "MAGBRIDGE_SINK")]
    sink: Option<SinkKind>,

    /// JSON output file; stdout when omitted.
    #[arg(long, short = 'o', global = true)]
    output: Option<PathBuf>,

    /// Records per JSON output file.
    #[arg(long, global = true)]
    split_size: Option<usize>,

    /// Create the output directory when it is missing.
    #[arg(long, global = true)]
    create_dirs: bool,

    /// JSON framing: `array` or `lines`.
    #[arg(long, global = true)]
    json_layout: Option<JsonLayout>,

    /// Destination host.
    #[arg(long, global = true, env = "PGHOST")]
    db_host: Option<String>,

    /// Destination port.
    #[arg(long, global = true, env = "PGPORT")]
    db_port: Option<u32>,

    /// Destination database.
    #[arg(long, global = true, env = "PGDATABASE")]
    db_name: Option<String>,

    /// Destination user.
    #[arg(long, global = true, env = "PGUSER")]
    db_user: Option<String>,

    /// Destination password.
    #[arg(long, global = true, env = "PGPASSWORD", hide_env_values = true)]
    db_password: Option<String>,

    /// Records per transaction.
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Attempts per batch before it is reported as failed.
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    /// Delay before the first retry, doubled on each further attempt.
    #[arg(long, global = true)]
    retry_backoff_ms: Option<u64>,

    /// Write `torrent_files` rows for multi-file torrents.
    #[arg(long, global = true)]
    add_files: bool,

    /// Maximum `torrent_files` rows per torrent.
    #[arg(long, global = true)]
    file_limit: Option<usize>,

    /// Write `torrent_contents` search rows.
    #[arg(long, global = true)]
    insert_content: bool,

    /// Padding handling for `torrent_files` only.
    #[arg(long, global = true)]
    sink_padding: Option<PaddingMode>,
}

impl Cli {
    /// Raw settings from the arguments alone, without any settings file.
    #[must_use]
    pub fn settings(&self) -> IngestSettings {
        let (source_kind, source_path, load_files, recursive, max_files_per_torrent) =
            match &self.source {
                None => (None, None, None, None, None),
                Some(SourceCommand::Sqlite { path, load_files }) => (
                    Some(SourceKind::Sqlite),
                    Some(path.clone()),
                    flag(*load_files),
                    None,
                    None,
                ),
                Some(SourceCommand::Torrents {
                    path,
                    recursive,
                    max_files,
                }) => (
                    Some(SourceKind::TorrentDir),
                    Some(path.clone()),
                    None,
                    flag(*recursive),
                    *max_files,
                ),
            };
        let sink = &self.sink;
        IngestSettings {
            source_kind,
            source_path,
            load_files,
            recursive,
            max_files_per_torrent,
            sink_kind: sink.sink,
            output: sink.output.clone(),
            split_size: sink.split_size,
            create_dirs: flag(sink.create_dirs),
            json_layout: sink.json_layout,
            db_host: sink.db_host.clone(),
            db_port: sink.db_port,
            db_name: sink.db_name.clone(),
            db_user: sink.db_user.clone(),
            db_password: sink.db_password.clone(),
            batch_size: sink.batch_size,
            max_attempts: sink.max_attempts,
            retry_backoff_ms: sink.retry_backoff_ms,
            add_files: flag(sink.add_files),
            file_limit: sink.file_limit,
            insert_content: flag(sink.insert_content),
            sink_padding: sink.sink_padding,
            negative_size: self.policy.negative_size,
            padding: self.policy.padding,
            source_label: self.policy.source_label.clone(),
            dry_run: flag(self.policy.dry_run),
        }
    }

    /// Validated configuration: the settings file, if any, overlaid with the
    /// arguments.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] when the settings file cannot be read or
    /// the combined settings are invalid.
    pub fn ingest_config(&self) -> AppResult<IngestConfig> {
        let base = match &self.config {
            Some(path) => load_settings_file(path)
                .map_err(|err| AppError::config("config.load_file", err))?,
            None => IngestSettings::default(),
        };
        IngestConfig::from_settings(base.overlay(self.settings()))
            .map_err(|err| AppError::config("config.validate", err))
    }
}

// Unset boolean flags stay `None` so a settings file can still turn them on.
const fn flag(set: bool) -> Option<bool> {
    if set { Some(true) } else { None }
}

/// Parse arguments, run one ingest, and return the process exit code.
///
/// The run summary is written to stderr as JSON; stdout carries only JSON
/// sink output.
pub async fn run() -> i32 {
    let cli = Cli::parse();
    let logging = LoggingConfig {
        level: &cli.log_level,
        format: cli.log_format.unwrap_or_else(LogFormat::infer),
        build_sha: env!("CARGO_PKG_VERSION"),
    };
    if let Err(err) = init_logging(&logging) {
        let err = AppError::telemetry("telemetry.init", err);
        eprintln!("error: {}", err.display_message());
        return err.exit_code();
    }

    let config = match cli.ingest_config() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, detail = ?err, "invalid configuration");
            eprintln!("error: {}", err.display_message());
            return err.exit_code();
        }
    };

    let shutdown = Shutdown::new();
    let signal = shutdown.signal();
    shutdown.listen_for_signals();

    match run_ingest(config, signal).await {
        Ok(summary) => {
            write_report(&summary.to_json());
            summary.exit_code()
        }
        Err(err) => {
            error!(error = %err, detail = ?err, "ingest aborted");
            eprintln!("error: {}", err.display_message());
            if let Some(summary) = err.summary() {
                write_report(&summary.to_aborted_json(err.exit_code()));
            }
            err.exit_code()
        }
    }
}

fn write_report(report: &serde_json::Value) {
    let mut stderr = io::stderr().lock();
    if let Err(err) = writeln!(stderr, "{report}") {
        warn!(error = %err, "failed to write run summary");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("magbridge").chain(args.iter().copied()))
            .expect("arguments parse")
    }

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn torrents_command_maps_to_directory_settings() {
        let cli = parse(&[
            "--sink",
            "json",
            "--negative-size",
            "zero",
            "torrents",
            "/srv/torrents",
            "--recursive",
            "--max-files",
            "50",
        ]);
        let settings = cli.settings();
        assert_eq!(settings.source_kind, Some(SourceKind::TorrentDir));
        assert_eq!(settings.source_path, Some(PathBuf::from("/srv/torrents")));
        assert_eq!(settings.recursive, Some(true));
        assert_eq!(settings.max_files_per_torrent, Some(50));
        assert_eq!(settings.negative_size, Some(NegativeSizePolicy::Zero));
        assert_eq!(settings.dry_run, None);
    }

    #[test]
    fn missing_negative_size_policy_is_a_configuration_error() {
        let cli = parse(&["--sink", "json", "sqlite", "/srv/crawl.sqlite3"]);
        let err = cli.ingest_config().expect_err("policy is required");
        assert_eq!(err.exit_code(), 2);
        assert!(err.display_message().contains("negative_size"));
    }

    #[test]
    fn global_options_are_accepted_after_the_subcommand() {
        let cli = parse(&[
            "sqlite",
            "/srv/crawl.sqlite3",
            "--sink",
            "database",
            "--negative-size",
            "reject",
            "--add-files",
            "--sink-padding",
            "include",
        ]);
        let settings = cli.settings();
        assert_eq!(settings.sink_kind, Some(SinkKind::Database));
        assert_eq!(settings.add_files, Some(true));
        assert_eq!(settings.sink_padding, Some(PaddingMode::Include));
        assert_eq!(settings.load_files, None);
    }
}
