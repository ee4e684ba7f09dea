//! Torrent content identifiers.

use std::fmt::{self, Debug, Display, Formatter};
use std::str::FromStr;

use serde::{Serialize, Serializer};
use sha1::{Digest, Sha1};
use sha2::Sha256;

use crate::error::InfoHashError;

/// Length in bytes of a v1 (SHA-1) infohash.
pub const V1_LEN: usize = 20;
/// Length in bytes of a v2 (SHA-256) infohash.
pub const V2_LEN: usize = 32;

/// Identifier derived by hashing a torrent's bencoded `info` dictionary.
///
/// Values are immutable once constructed and render as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InfoHash {
    /// BitTorrent v1 identifier (SHA-1).
    V1([u8; V1_LEN]),
    /// BitTorrent v2 identifier (SHA-256).
    V2([u8; V2_LEN]),
}

impl InfoHash {
    /// Hash the exact bytes of an `info` dictionary with SHA-1.
    #[must_use]
    pub fn v1_of(info: &[u8]) -> Self {
        let mut out = [0_u8; V1_LEN];
        out.copy_from_slice(&Sha1::digest(info));
        Self::V1(out)
    }

    /// Hash the exact bytes of an `info` dictionary with SHA-256.
    #[must_use]
    pub fn v2_of(info: &[u8]) -> Self {
        let mut out = [0_u8; V2_LEN];
        out.copy_from_slice(&Sha256::digest(info));
        Self::V2(out)
    }

    /// Build an identifier from its raw 20 or 32 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`InfoHashError::InvalidLength`] for any other length.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, InfoHashError> {
        match bytes.len() {
            V1_LEN => {
                let mut out = [0_u8; V1_LEN];
                out.copy_from_slice(bytes);
                Ok(Self::V1(out))
            }
            V2_LEN => {
                let mut out = [0_u8; V2_LEN];
                out.copy_from_slice(bytes);
                Ok(Self::V2(out))
            }
            length => Err(InfoHashError::InvalidLength { length }),
        }
    }

    /// Parse a 40 or 64 character hex string (either case).
    ///
    /// # Errors
    ///
    /// Returns an error when the text is not hex or decodes to the wrong length.
    pub fn from_hex(value: &str) -> Result<Self, InfoHashError> {
        let bytes = hex::decode(value.trim()).map_err(|_| InfoHashError::InvalidHex {
            value: value.to_string(),
        })?;
        Self::from_bytes(&bytes)
    }

    /// Raw identifier bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8] {
        match self {
            Self::V1(bytes) => bytes,
            Self::V2(bytes) => bytes,
        }
    }

    /// Lowercase hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// Whether this is a v2 (SHA-256) identifier.
    #[must_use]
    pub const fn is_v2(&self) -> bool {
        matches!(self, Self::V2(_))
    }
}

impl Display for InfoHash {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.to_hex())
    }
}

impl Debug for InfoHash {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "InfoHash({self})")
    }
}

impl FromStr for InfoHash {
    type Err = InfoHashError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_hex(value)
    }
}

impl Serialize for InfoHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}
