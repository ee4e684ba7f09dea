//! Turning raw [`IngestSettings`] into a validated [`IngestConfig`].

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use magbridge_core::{PaddingMode, SanitizerConfig};

use crate::defaults::{
    DEFAULT_BATCH_SIZE, DEFAULT_DB_PORT, DEFAULT_FILE_LIMIT, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_RETRY_BACKOFF_MS, MAX_BATCH_SIZE, SQLITE_SOURCE_LABEL, TORRENT_DIR_SOURCE_LABEL,
};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{
    ConnectionSettings, DatabaseSinkConfig, FileRows, IngestConfig, IngestSettings,
    JsonSinkConfig, JsonTarget, SinkConfig, SinkKind, SourceConfig, SourceKind,
};

impl IngestConfig {
    /// Validate `settings` and fill in defaults.
    ///
    /// The negative-size policy has no default here: callers must choose one.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first missing, out-of-range, or
    /// conflicting setting.
    pub fn from_settings(settings: IngestSettings) -> ConfigResult<Self> {
        let source_kind = settings
            .source_kind
            .ok_or(ConfigError::MissingField {
                field: "source_kind",
            })?;
        let sink_kind = settings.sink_kind.ok_or(ConfigError::MissingField {
            field: "sink_kind",
        })?;
        let negative_size = settings.negative_size.ok_or(ConfigError::MissingField {
            field: "negative_size",
        })?;

        let sink = match sink_kind {
            SinkKind::Json => SinkConfig::Json(json_sink(&settings)?),
            SinkKind::Database => SinkConfig::Database(database_sink(&settings)?),
        };
        let source = source(source_kind, &settings, &sink)?;
        let source_label = source_label(source_kind, settings.source_label.as_deref())?;

        let mut sanitizer = SanitizerConfig {
            negative_size,
            padding: settings.padding.unwrap_or_default(),
        };
        // Padding rows requested by the sink must survive the sanitizer.
        if let SinkConfig::Database(db) = &sink
            && db.padding == PaddingMode::Include
        {
            sanitizer.padding = PaddingMode::Include;
        }

        Ok(Self {
            source,
            sink,
            sanitizer,
            source_label,
            dry_run: settings.dry_run.unwrap_or(false),
        })
    }
}

fn source(
    kind: SourceKind,
    settings: &IngestSettings,
    sink: &SinkConfig,
) -> ConfigResult<SourceConfig> {
    let path = settings
        .source_path
        .clone()
        .ok_or(ConfigError::MissingField {
            field: "source_path",
        })?;
    match kind {
        SourceKind::Sqlite => {
            let wants_files = matches!(sink, SinkConfig::Database(db) if db.files.enabled);
            Ok(SourceConfig::Sqlite {
                path,
                load_files: settings.load_files.unwrap_or(wants_files),
            })
        }
        SourceKind::TorrentDir => {
            if settings.max_files_per_torrent == Some(0) {
                return Err(ConfigError::InvalidField {
                    field: "max_files_per_torrent",
                    value: Some("0".to_string()),
                    reason: "must be at least 1",
                });
            }
            Ok(SourceConfig::TorrentDir {
                root: path,
                recursive: settings.recursive.unwrap_or(false),
                max_files_per_torrent: settings.max_files_per_torrent,
            })
        }
    }
}

fn source_label(kind: SourceKind, supplied: Option<&str>) -> ConfigResult<String> {
    let Some(label) = supplied else {
        return Ok(match kind {
            SourceKind::Sqlite => SQLITE_SOURCE_LABEL,
            SourceKind::TorrentDir => TORRENT_DIR_SOURCE_LABEL,
        }
        .to_string());
    };
    let trimmed = label.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidField {
            field: "source_label",
            value: Some(label.to_string()),
            reason: "must not be blank",
        });
    }
    Ok(trimmed.to_string())
}

fn json_sink(settings: &IngestSettings) -> ConfigResult<JsonSinkConfig> {
    let split_size = match settings.split_size {
        None => None,
        Some(size) => Some(NonZeroUsize::new(size).ok_or(ConfigError::InvalidField {
            field: "split_size",
            value: Some(size.to_string()),
            reason: "must be at least 1",
        })?),
    };

    let target = match &settings.output {
        None => {
            if split_size.is_some() {
                return Err(ConfigError::Conflict {
                    field: "split_size",
                    other: "output",
                });
            }
            JsonTarget::Stdout
        }
        Some(path) => {
            let create_dirs = settings.create_dirs.unwrap_or(false);
            if !create_dirs {
                ensure_parent_exists(path)?;
            }
            JsonTarget::File {
                path: path.clone(),
                split_size,
                create_dirs,
            }
        }
    };

    Ok(JsonSinkConfig {
        target,
        layout: settings.json_layout.unwrap_or_default(),
    })
}

fn ensure_parent_exists(path: &Path) -> ConfigResult<()> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    if parent.is_dir() {
        Ok(())
    } else {
        Err(ConfigError::InvalidField {
            field: "output",
            value: Some(path.display().to_string()),
            reason: "parent directory does not exist",
        })
    }
}

fn database_sink(settings: &IngestSettings) -> ConfigResult<DatabaseSinkConfig> {
    if settings.split_size.is_some() {
        return Err(ConfigError::Conflict {
            field: "split_size",
            other: "sink_kind",
        });
    }

    let port = match settings.db_port {
        None => DEFAULT_DB_PORT,
        Some(port) => u16::try_from(port)
            .ok()
            .filter(|port| *port >= 1)
            .ok_or(ConfigError::InvalidField {
                field: "db_port",
                value: Some(port.to_string()),
                reason: "must be between 1 and 65535",
            })?,
    };
    let connection = ConnectionSettings {
        host: required_text(settings.db_host.as_deref(), "db_host")?,
        port,
        database: required_text(settings.db_name.as_deref(), "db_name")?,
        user: required_text(settings.db_user.as_deref(), "db_user")?,
        password: settings.db_password.clone(),
    };

    let batch_size = settings.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
    if !(1..=MAX_BATCH_SIZE).contains(&batch_size) {
        return Err(ConfigError::InvalidField {
            field: "batch_size",
            value: Some(batch_size.to_string()),
            reason: "must be between 1 and 5000",
        });
    }
    let max_attempts = settings.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS);
    if max_attempts == 0 {
        return Err(ConfigError::InvalidField {
            field: "max_attempts",
            value: Some("0".to_string()),
            reason: "must be at least 1",
        });
    }
    let limit = settings.file_limit.unwrap_or(DEFAULT_FILE_LIMIT);
    if limit == 0 {
        return Err(ConfigError::InvalidField {
            field: "file_limit",
            value: Some("0".to_string()),
            reason: "must be at least 1",
        });
    }

    Ok(DatabaseSinkConfig {
        connection,
        batch_size,
        max_attempts,
        retry_backoff: Duration::from_millis(
            settings.retry_backoff_ms.unwrap_or(DEFAULT_RETRY_BACKOFF_MS),
        ),
        files: FileRows {
            enabled: settings.add_files.unwrap_or(false),
            limit,
        },
        insert_content: settings.insert_content.unwrap_or(false),
        padding: settings
            .sink_padding
            .or(settings.padding)
            .unwrap_or_default(),
    })
}

fn required_text(value: Option<&str>, field: &'static str) -> ConfigResult<String> {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(ConfigError::MissingField { field }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JsonLayout;
    use magbridge_core::NegativeSizePolicy;

    fn json_settings() -> IngestSettings {
        IngestSettings {
            source_kind: Some(SourceKind::TorrentDir),
            source_path: Some(PathBuf::from("/srv/torrents")),
            sink_kind: Some(SinkKind::Json),
            negative_size: Some(NegativeSizePolicy::Skip),
            ..IngestSettings::default()
        }
    }

    fn database_settings() -> IngestSettings {
        IngestSettings {
            source_kind: Some(SourceKind::Sqlite),
            source_path: Some(PathBuf::from("/srv/crawl.sqlite3")),
            sink_kind: Some(SinkKind::Database),
            negative_size: Some(NegativeSizePolicy::Zero),
            db_host: Some("db.internal".to_string()),
            db_name: Some("bitmagnet".to_string()),
            db_user: Some("importer".to_string()),
            db_password: Some("hunter2".to_string()),
            ..IngestSettings::default()
        }
    }

    #[test]
    fn json_defaults_to_stdout_array_and_directory_label() -> ConfigResult<()> {
        let config = IngestConfig::from_settings(json_settings())?;
        assert_eq!(config.source_label, ".torrent");
        assert!(!config.dry_run);
        assert_eq!(
            config.sink,
            SinkConfig::Json(JsonSinkConfig {
                target: JsonTarget::Stdout,
                layout: JsonLayout::Array,
            })
        );
        assert_eq!(
            config.source,
            SourceConfig::TorrentDir {
                root: PathBuf::from("/srv/torrents"),
                recursive: false,
                max_files_per_torrent: None,
            }
        );
        Ok(())
    }

    #[test]
    fn negative_size_policy_must_be_explicit() {
        let settings = IngestSettings {
            negative_size: None,
            ..json_settings()
        };
        assert!(matches!(
            IngestConfig::from_settings(settings),
            Err(ConfigError::MissingField {
                field: "negative_size"
            })
        ));
    }

    #[test]
    fn split_requires_a_file_target() {
        let settings = IngestSettings {
            split_size: Some(10),
            ..json_settings()
        };
        assert!(matches!(
            IngestConfig::from_settings(settings),
            Err(ConfigError::Conflict {
                field: "split_size",
                other: "output"
            })
        ));

        let zero = IngestSettings {
            split_size: Some(0),
            output: Some(PathBuf::from("out.json")),
            ..json_settings()
        };
        assert!(matches!(
            IngestConfig::from_settings(zero),
            Err(ConfigError::InvalidField {
                field: "split_size",
                ..
            })
        ));
    }

    #[test]
    fn missing_output_parent_is_rejected_unless_created() -> ConfigResult<()> {
        let path = PathBuf::from("/definitely/not/here/out.json");
        let settings = IngestSettings {
            output: Some(path.clone()),
            ..json_settings()
        };
        assert!(matches!(
            IngestConfig::from_settings(settings.clone()),
            Err(ConfigError::InvalidField {
                field: "output",
                reason: "parent directory does not exist",
                ..
            })
        ));

        let config = IngestConfig::from_settings(IngestSettings {
            create_dirs: Some(true),
            split_size: Some(100),
            ..settings
        })?;
        match config.sink {
            SinkConfig::Json(JsonSinkConfig {
                target:
                    JsonTarget::File {
                        path: configured,
                        split_size,
                        create_dirs,
                    },
                ..
            }) => {
                assert_eq!(configured, path);
                assert_eq!(split_size.map(NonZeroUsize::get), Some(100));
                assert!(create_dirs);
            }
            other => panic!("unexpected sink {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn database_defaults_and_file_loading() -> ConfigResult<()> {
        let config = IngestConfig::from_settings(IngestSettings {
            add_files: Some(true),
            ..database_settings()
        })?;
        assert_eq!(config.source_label, "magnetico");
        assert_eq!(
            config.source,
            SourceConfig::Sqlite {
                path: PathBuf::from("/srv/crawl.sqlite3"),
                load_files: true,
            }
        );
        let SinkConfig::Database(db) = config.sink else {
            panic!("expected database sink");
        };
        assert_eq!(db.connection.port, 5432);
        assert_eq!(db.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(db.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(db.files, FileRows { enabled: true, limit: 500 });
        assert_eq!(db.padding, PaddingMode::Exclude);
        Ok(())
    }

    #[test]
    fn database_ranges_are_enforced() {
        for (settings, field) in [
            (
                IngestSettings {
                    db_port: Some(70_000),
                    ..database_settings()
                },
                "db_port",
            ),
            (
                IngestSettings {
                    db_port: Some(0),
                    ..database_settings()
                },
                "db_port",
            ),
            (
                IngestSettings {
                    batch_size: Some(5_001),
                    ..database_settings()
                },
                "batch_size",
            ),
            (
                IngestSettings {
                    max_attempts: Some(0),
                    ..database_settings()
                },
                "max_attempts",
            ),
            (
                IngestSettings {
                    file_limit: Some(0),
                    ..database_settings()
                },
                "file_limit",
            ),
            (
                IngestSettings {
                    db_host: Some("  ".to_string()),
                    ..database_settings()
                },
                "db_host",
            ),
        ] {
            let err = IngestConfig::from_settings(settings).expect_err("invalid settings");
            assert_eq!(err.field(), Some(field));
        }
    }

    #[test]
    fn sink_padding_override_keeps_padding_through_sanitizer() -> ConfigResult<()> {
        let config = IngestConfig::from_settings(IngestSettings {
            sink_padding: Some(PaddingMode::Include),
            ..database_settings()
        })?;
        assert_eq!(config.sanitizer.padding, PaddingMode::Include);
        assert_eq!(config.sanitizer.negative_size, NegativeSizePolicy::Zero);
        Ok(())
    }

    #[test]
    fn blank_label_is_rejected_and_labels_are_trimmed() -> ConfigResult<()> {
        let blank = IngestSettings {
            source_label: Some("   ".to_string()),
            ..json_settings()
        };
        assert!(matches!(
            IngestConfig::from_settings(blank),
            Err(ConfigError::InvalidField {
                field: "source_label",
                ..
            })
        ));
        let config = IngestConfig::from_settings(IngestSettings {
            source_label: Some(" MyCrawl ".to_string()),
            ..json_settings()
        })?;
        assert_eq!(config.source_label, "MyCrawl");
        Ok(())
    }

    #[test]
    fn password_is_redacted_in_debug_output() -> ConfigResult<()> {
        let config = IngestConfig::from_settings(database_settings())?;
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
        Ok(())
    }
}
