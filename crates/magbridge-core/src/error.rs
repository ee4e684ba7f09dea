//! # Design
//!
//! - Constant error messages; the offending offset, field, or value travels as context.
//! - Decoder errors always carry the byte offset where decoding stopped.
//! - Metainfo errors separate structural decode failures from typed narrowing failures.

use thiserror::Error;

use crate::bencode::ValueKind;

/// Errors produced while decoding a bencoded buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BencodeError {
    /// The buffer did not follow the bencode grammar.
    #[error("malformed bencode")]
    Malformed {
        /// Byte offset where decoding failed.
        offset: usize,
        /// Static reason for the failure.
        reason: &'static str,
    },
    /// An integer did not fit in a signed 64-bit value.
    #[error("bencode integer out of range")]
    IntegerOverflow {
        /// Byte offset of the integer token.
        offset: usize,
    },
    /// Containers were nested deeper than the decoder allows.
    #[error("bencode nesting too deep")]
    TooDeep {
        /// Byte offset of the container that exceeded the limit.
        offset: usize,
    },
    /// Bytes remained after the root value.
    #[error("trailing data after bencode root")]
    TrailingData {
        /// Byte offset of the first trailing byte.
        offset: usize,
    },
}

impl BencodeError {
    /// Byte offset at which decoding failed.
    #[must_use]
    pub const fn offset(&self) -> usize {
        match self {
            Self::Malformed { offset, .. }
            | Self::IntegerOverflow { offset }
            | Self::TooDeep { offset }
            | Self::TrailingData { offset } => *offset,
        }
    }
}

/// Errors raised when an identifier cannot be parsed into an infohash.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InfoHashError {
    /// Raw identifier was neither 20 nor 32 bytes long.
    #[error("infohash has invalid length")]
    InvalidLength {
        /// Length that was supplied.
        length: usize,
    },
    /// Hex representation contained non-hex characters.
    #[error("infohash is not valid hex")]
    InvalidHex {
        /// Offending value.
        value: String,
    },
}

/// Errors raised while extracting a canonical record from `.torrent` bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetainfoError {
    /// The buffer was not valid bencode.
    #[error("torrent is not valid bencode")]
    Encoding {
        /// Underlying decoder error.
        #[from]
        source: BencodeError,
    },
    /// A required key was absent.
    #[error("torrent field missing")]
    MissingField {
        /// Dotted path of the missing field.
        field: &'static str,
    },
    /// A field decoded to a different bencode type than expected.
    #[error("torrent field has unexpected type")]
    UnexpectedType {
        /// Dotted path of the field.
        field: &'static str,
        /// Type the field was expected to have.
        expected: ValueKind,
        /// Type that was found.
        found: ValueKind,
        /// Byte offset of the offending value.
        offset: usize,
    },
    /// A field had the right type but an unusable value.
    #[error("torrent field has invalid value")]
    InvalidValue {
        /// Dotted path of the field.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
    },
}

impl MetainfoError {
    /// Byte offset associated with the failure when one is known.
    #[must_use]
    pub const fn offset(&self) -> Option<usize> {
        match self {
            Self::Encoding { source } => Some(source.offset()),
            Self::UnexpectedType { offset, .. } => Some(*offset),
            Self::MissingField { .. } | Self::InvalidValue { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn metainfo_error_exposes_decoder_offset_and_source() {
        let err = MetainfoError::from(BencodeError::TrailingData { offset: 42 });
        assert_eq!(err.to_string(), "torrent is not valid bencode");
        assert_eq!(err.offset(), Some(42));
        assert!(err.source().is_some());

        let missing = MetainfoError::MissingField { field: "info" };
        assert_eq!(missing.offset(), None);
        assert!(missing.source().is_none());
    }
}
