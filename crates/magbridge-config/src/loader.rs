//! JSON settings files.

use std::fs;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::model::IngestSettings;

/// Read an [`IngestSettings`] bag from a JSON file.
///
/// Unknown keys are rejected so typos surface instead of being ignored.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when the file cannot be read and
/// [`ConfigError::Parse`] when it is not a valid settings object.
pub fn load_settings_file(path: &Path) -> ConfigResult<IngestSettings> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SinkKind, SourceKind};
    use magbridge_core::NegativeSizePolicy;

    #[test]
    fn parses_kebab_case_kinds_and_policies() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{
                "source_kind": "torrent-dir",
                "source_path": "/srv/torrents",
                "sink_kind": "json",
                "negative_size": "reject",
                "split_size": 250
            }"#,
        )?;
        let settings = load_settings_file(&path)?;
        assert_eq!(settings.source_kind, Some(SourceKind::TorrentDir));
        assert_eq!(settings.sink_kind, Some(SinkKind::Json));
        assert_eq!(settings.negative_size, Some(NegativeSizePolicy::Reject));
        assert_eq!(settings.split_size, Some(250));
        assert_eq!(settings.output, None);
        Ok(())
    }

    #[test]
    fn unknown_keys_and_missing_files_are_reported() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "batchsize": 10 }"#)?;
        assert!(matches!(
            load_settings_file(&path),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            load_settings_file(&dir.path().join("absent.json")),
            Err(ConfigError::Io { .. })
        ));
        Ok(())
    }
}
