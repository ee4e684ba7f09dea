//! Per-record policy enforcement applied between sources and sinks.
//!
//! # Design
//!
//! - Stateless: one record in, one outcome out.
//! - Fixed order: padding handling, then the negative-size policy, then
//!   control-character cleanup of the name and file paths.
//! - Padding removal only touches `files`; `total_size` is never recomputed.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::infohash::InfoHash;
use crate::record::TorrentRecord;
use crate::text::{is_padding_path, strip_control_chars};

/// What to do with a record whose declared total size is negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NegativeSizePolicy {
    /// Drop the record; counted as dropped.
    #[default]
    Skip,
    /// Clamp the size to zero and keep the record.
    Zero,
    /// Refuse the record; counted as an error.
    Reject,
}

impl NegativeSizePolicy {
    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::Zero => "zero",
            Self::Reject => "reject",
        }
    }
}

impl Display for NegativeSizePolicy {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for NegativeSizePolicy {
    type Err = UnknownPolicy;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "zero" => Ok(Self::Zero),
            "reject" => Ok(Self::Reject),
            _ => Err(UnknownPolicy {
                value: value.to_string(),
            }),
        }
    }
}

/// Whether padding files stay in a record's file list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaddingMode {
    /// Remove padding entries from `files`.
    #[default]
    Exclude,
    /// Keep padding entries, flagged.
    Include,
}

impl PaddingMode {
    /// Stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exclude => "exclude",
            Self::Include => "include",
        }
    }
}

impl FromStr for PaddingMode {
    type Err = UnknownPolicy;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "exclude" => Ok(Self::Exclude),
            "include" => Ok(Self::Include),
            _ => Err(UnknownPolicy {
                value: value.to_string(),
            }),
        }
    }
}

/// Returned when a policy label is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown policy value")]
pub struct UnknownPolicy {
    /// Label that failed to parse.
    pub value: String,
}

/// Sanitizer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SanitizerConfig {
    /// Negative-size handling.
    pub negative_size: NegativeSizePolicy,
    /// Padding-file handling.
    pub padding: PaddingMode,
}

/// Outcome of sanitising one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sanitized {
    /// Record is ready for a sink.
    Accepted(TorrentRecord),
    /// Removed by the `skip` policy.
    Dropped {
        /// Identifier of the dropped record.
        infohash: InfoHash,
        /// Offending declared size.
        total_size: i64,
    },
    /// Refused by the `reject` policy.
    Rejected {
        /// Identifier of the rejected record.
        infohash: InfoHash,
        /// Offending declared size.
        total_size: i64,
    },
}

/// Applies [`SanitizerConfig`] to records.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordSanitizer {
    config: SanitizerConfig,
}

impl RecordSanitizer {
    /// Build a sanitizer for the given settings.
    #[must_use]
    pub const fn new(config: SanitizerConfig) -> Self {
        Self { config }
    }

    /// Active settings.
    #[must_use]
    pub const fn config(&self) -> SanitizerConfig {
        self.config
    }

    /// Run every policy over `record`.
    #[must_use]
    pub fn sanitize(&self, mut record: TorrentRecord) -> Sanitized {
        let files = record.files_mut();
        for file in files.iter_mut() {
            file.padding = file.padding || is_padding_path(&file.path);
        }
        if self.config.padding == PaddingMode::Exclude {
            files.retain(|file| !file.padding);
        }

        let total_size = record.total_size();
        if total_size < 0 {
            let infohash = *record.infohash();
            match self.config.negative_size {
                NegativeSizePolicy::Skip => {
                    debug!(%infohash, total_size, "record dropped by negative size policy");
                    return Sanitized::Dropped {
                        infohash,
                        total_size,
                    };
                }
                NegativeSizePolicy::Reject => {
                    warn!(%infohash, total_size, "record rejected by negative size policy");
                    return Sanitized::Rejected {
                        infohash,
                        total_size,
                    };
                }
                NegativeSizePolicy::Zero => {
                    debug!(%infohash, total_size, "negative size clamped to zero");
                    record.set_total_size(0);
                }
            }
        }

        let name = strip_control_chars(record.name());
        if name != record.name() {
            record.set_name(name);
        }
        for file in record.files_mut() {
            if file.path.chars().any(char::is_control) {
                file.path = strip_control_chars(&file.path);
            }
        }

        Sanitized::Accepted(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FileLayout, TorrentFileEntry};

    fn multi_record(total_size: i64) -> TorrentRecord {
        TorrentRecord::new(InfoHash::v1_of(b"sanitize"), "album\0", total_size, "test").with_files(
            FileLayout::Multi,
            vec![
                TorrentFileEntry::new(0, "01.flac", 100),
                TorrentFileEntry::new(1, "_____padding_file_0_", 24),
                TorrentFileEntry::new(2, "02.\u{1}flac", 76),
            ],
            3,
        )
    }

    fn accepted(outcome: Sanitized) -> TorrentRecord {
        match outcome {
            Sanitized::Accepted(record) => record,
            other => panic!("expected accepted record, got {other:?}"),
        }
    }

    #[test]
    fn excluding_padding_keeps_total_size() {
        let record = accepted(RecordSanitizer::default().sanitize(multi_record(200)));
        assert_eq!(record.total_size(), 200);
        assert_eq!(record.file_count(), 3);
        let paths: Vec<_> = record.files().iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["01.flac", "02.flac"]);
        assert_eq!(record.name(), "album");
    }

    #[test]
    fn including_padding_flags_entries() {
        let sanitizer = RecordSanitizer::new(SanitizerConfig {
            padding: PaddingMode::Include,
            ..SanitizerConfig::default()
        });
        let record = accepted(sanitizer.sanitize(multi_record(200)));
        let flags: Vec<_> = record.files().iter().map(|f| f.padding).collect();
        assert_eq!(flags, vec![false, true, false]);
    }

    #[test]
    fn negative_size_policies() {
        let skip = RecordSanitizer::default().sanitize(multi_record(-1));
        assert!(matches!(skip, Sanitized::Dropped { total_size: -1, .. }));

        let reject = RecordSanitizer::new(SanitizerConfig {
            negative_size: NegativeSizePolicy::Reject,
            ..SanitizerConfig::default()
        })
        .sanitize(multi_record(-5));
        assert!(matches!(reject, Sanitized::Rejected { total_size: -5, .. }));

        let zero = RecordSanitizer::new(SanitizerConfig {
            negative_size: NegativeSizePolicy::Zero,
            padding: PaddingMode::Include,
        });
        let record = accepted(zero.sanitize(multi_record(-7)));
        assert_eq!(record.total_size(), 0);
        assert_eq!(record.files().len(), 3);
    }

    #[test]
    fn policy_labels_parse_case_insensitively() {
        assert_eq!("Zero".parse::<NegativeSizePolicy>(), Ok(NegativeSizePolicy::Zero));
        assert_eq!(" reject ".parse::<NegativeSizePolicy>(), Ok(NegativeSizePolicy::Reject));
        assert_eq!("include".parse::<PaddingMode>(), Ok(PaddingMode::Include));
        assert!("drop".parse::<NegativeSizePolicy>().is_err());
        assert_eq!(NegativeSizePolicy::Skip.to_string(), "skip");
    }
}
