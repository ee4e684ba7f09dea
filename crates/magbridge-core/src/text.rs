//! Byte-to-text repair for torrent names and file paths.
//!
//! Torrent metadata carries no charset declaration. Names are tried as UTF-8
//! first, then against a fixed list of legacy encodings common in crawled
//! metadata, and finally decoded lossily with replacement characters.

use encoding_rs::{EUC_JP, Encoding, GB18030, GBK, SHIFT_JIS, WINDOWS_1251, WINDOWS_1252};

/// Name fragments the BitComet client uses for alignment filler files.
const PADDING_MARKERS: [&str; 2] = ["_____padding", ".____padding"];

/// Encoding label reported when the lossy fallback was used.
pub const LOSSY_LABEL: &str = "utf-8-lossy";

/// Result of decoding a byte string into text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    /// Decoded text.
    pub text: String,
    /// Name of the encoding that produced `text`.
    pub encoding: &'static str,
    /// True when the input was not valid UTF-8.
    pub repaired: bool,
}

/// Decode `bytes` into text, repairing non-UTF-8 input.
#[must_use]
pub fn decode_text(bytes: &[u8]) -> DecodedText {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return DecodedText {
            text: text.to_owned(),
            encoding: encoding_rs::UTF_8.name(),
            repaired: false,
        };
    }

    for encoding in fallback_encodings() {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            return DecodedText {
                text: text.into_owned(),
                encoding: encoding.name(),
                repaired: true,
            };
        }
    }

    DecodedText {
        text: String::from_utf8_lossy(bytes).into_owned(),
        encoding: LOSSY_LABEL,
        repaired: true,
    }
}

/// Legacy encodings tried, in order, after strict UTF-8 fails.
fn fallback_encodings() -> [&'static Encoding; 6] {
    [SHIFT_JIS, EUC_JP, GBK, GB18030, WINDOWS_1251, WINDOWS_1252]
}

/// Remove control characters (including NUL) and surrounding whitespace.
#[must_use]
pub fn strip_control_chars(text: &str) -> String {
    let cleaned: String = text.chars().filter(|ch| !ch.is_control()).collect();
    cleaned.trim().to_owned()
}

/// Whether a file path follows the BitComet padding-file naming convention.
#[must_use]
pub fn is_padding_path(path: &str) -> bool {
    PADDING_MARKERS.iter().any(|marker| path.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_utf8_is_not_repaired() {
        let decoded = decode_text("Ubuntu 24.04 – ISO".as_bytes());
        assert_eq!(decoded.text, "Ubuntu 24.04 – ISO");
        assert_eq!(decoded.encoding, "UTF-8");
        assert!(!decoded.repaired);
    }

    #[test]
    fn shift_jis_names_are_recovered() {
        // "テスト" in Shift_JIS
        let decoded = decode_text(&[0x83, 0x65, 0x83, 0x58, 0x83, 0x67]);
        assert_eq!(decoded.text, "テスト");
        assert_eq!(decoded.encoding, "Shift_JIS");
        assert!(decoded.repaired);
    }

    #[test]
    fn strips_nul_and_control_characters() {
        assert_eq!(strip_control_chars("  movie\0.mkv\r\n"), "movie.mkv");
        assert_eq!(strip_control_chars("a\u{7}b"), "ab");
    }

    #[test]
    fn recognises_bitcomet_padding_names() {
        assert!(is_padding_path(
            "album/_____padding_file_0_if you see this file, please update to BitComet 0.85 or above____"
        ));
        assert!(is_padding_path(".____padding_file/0"));
        assert!(!is_padding_path("album/track01.flac"));
        assert!(!is_padding_path(".pad/0"));
    }
}
