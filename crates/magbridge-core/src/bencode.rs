//! Order-preserving bencode decoder.
//!
//! Every decoded [`Node`] borrows the exact byte range it was parsed from, so a
//! sub-dictionary such as `info` can be hashed without re-encoding it. Dictionary
//! entries stay in declaration order and keys are not required to be sorted.

use std::fmt::{self, Display, Formatter};

use crate::error::BencodeError;

/// Maximum container nesting accepted before decoding is aborted.
pub const MAX_DEPTH: usize = 256;

/// Decode a buffer that must contain exactly one bencoded value.
///
/// # Errors
///
/// Returns [`BencodeError`] when the grammar is violated, an integer does not fit
/// in `i64`, nesting exceeds [`MAX_DEPTH`], or bytes follow the root value.
pub fn decode(input: &[u8]) -> Result<Node<'_>, BencodeError> {
    let (root, consumed) = decode_prefix(input)?;
    if consumed != input.len() {
        return Err(BencodeError::TrailingData { offset: consumed });
    }
    Ok(root)
}

/// Decode the first bencoded value in `input`, returning it with the number of
/// bytes consumed. Trailing bytes are left for the caller.
///
/// # Errors
///
/// Returns [`BencodeError`] when the leading value is malformed.
pub fn decode_prefix(input: &[u8]) -> Result<(Node<'_>, usize), BencodeError> {
    let mut decoder = Decoder { input, pos: 0 };
    let root = decoder.parse(0)?;
    Ok((root, decoder.pos))
}

/// Discriminant of a decoded value, used in typed narrowing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Length-prefixed byte string.
    Bytes,
    /// Signed integer.
    Int,
    /// Ordered list.
    List,
    /// Dictionary with byte-string keys.
    Dict,
}

impl ValueKind {
    /// Human-readable label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bytes => "byte string",
            Self::Int => "integer",
            Self::List => "list",
            Self::Dict => "dictionary",
        }
    }
}

impl Display for ValueKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// A decoded bencode value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value<'a> {
    /// Raw byte string; not guaranteed to be UTF-8.
    Bytes(&'a [u8]),
    /// Integer narrowed to `i64`.
    Int(i64),
    /// List of nodes in source order.
    List(Vec<Node<'a>>),
    /// Dictionary in declaration order.
    Dict(Dict<'a>),
}

/// A value together with the input bytes it was decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node<'a> {
    value: Value<'a>,
    offset: usize,
    raw: &'a [u8],
}

impl<'a> Node<'a> {
    /// Decoded value.
    #[must_use]
    pub const fn value(&self) -> &Value<'a> {
        &self.value
    }

    /// Exact encoded bytes of this value, as they appeared in the input.
    #[must_use]
    pub const fn raw(&self) -> &'a [u8] {
        self.raw
    }

    /// Byte offset where this value starts.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    /// Kind of the decoded value.
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self.value {
            Value::Bytes(_) => ValueKind::Bytes,
            Value::Int(_) => ValueKind::Int,
            Value::List(_) => ValueKind::List,
            Value::Dict(_) => ValueKind::Dict,
        }
    }

    /// Byte string payload, if this is a byte string.
    #[must_use]
    pub const fn as_bytes(&self) -> Option<&'a [u8]> {
        match self.value {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Integer payload, if this is an integer.
    #[must_use]
    pub const fn as_int(&self) -> Option<i64> {
        match self.value {
            Value::Int(value) => Some(value),
            _ => None,
        }
    }

    /// List items, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Node<'a>]> {
        match &self.value {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Dictionary, if this is a dictionary.
    #[must_use]
    pub const fn as_dict(&self) -> Option<&Dict<'a>> {
        match &self.value {
            Value::Dict(dict) => Some(dict),
            _ => None,
        }
    }
}

/// Dictionary entries in the order they were declared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dict<'a> {
    entries: Vec<(&'a [u8], Node<'a>)>,
}

impl<'a> Dict<'a> {
    /// First value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&Node<'a>> {
        self.entries
            .iter()
            .find(|(candidate, _)| *candidate == key)
            .map(|(_, node)| node)
    }

    /// Whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Iterate entries in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a [u8], &Node<'a>)> {
        self.entries.iter().map(|(key, node)| (*key, node))
    }

    /// Number of entries, duplicates included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the dictionary has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct Decoder<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn parse(&mut self, depth: usize) -> Result<Node<'a>, BencodeError> {
        let start = self.pos;
        let value = match self.peek()? {
            b'i' => Value::Int(self.parse_int()?),
            b'0'..=b'9' => Value::Bytes(self.parse_bytes()?),
            b'l' => {
                self.enter(depth, start)?;
                let mut items = Vec::new();
                while self.peek()? != b'e' {
                    items.push(self.parse(depth + 1)?);
                }
                self.pos += 1;
                Value::List(items)
            }
            b'd' => {
                self.enter(depth, start)?;
                let mut entries = Vec::new();
                while self.peek()? != b'e' {
                    if !self.peek()?.is_ascii_digit() {
                        return Err(BencodeError::Malformed {
                            offset: self.pos,
                            reason: "dictionary key is not a byte string",
                        });
                    }
                    let key = self.parse_bytes()?;
                    let value = self.parse(depth + 1)?;
                    entries.push((key, value));
                }
                self.pos += 1;
                Value::Dict(Dict { entries })
            }
            _ => {
                return Err(BencodeError::Malformed {
                    offset: start,
                    reason: "unexpected token",
                });
            }
        };

        let end = self.pos;
        Ok(Node {
            value,
            offset: start,
            raw: &self.input[start..end],
        })
    }

    fn enter(&mut self, depth: usize, start: usize) -> Result<(), BencodeError> {
        if depth >= MAX_DEPTH {
            return Err(BencodeError::TooDeep { offset: start });
        }
        self.pos += 1;
        Ok(())
    }

    fn peek(&self) -> Result<u8, BencodeError> {
        self.input
            .get(self.pos)
            .copied()
            .ok_or(BencodeError::Malformed {
                offset: self.pos,
                reason: "unexpected end of input",
            })
    }

    fn take_digits(&mut self) -> &'a [u8] {
        let start = self.pos;
        while self
            .input
            .get(self.pos)
            .is_some_and(u8::is_ascii_digit)
        {
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    fn expect(&mut self, byte: u8, reason: &'static str) -> Result<(), BencodeError> {
        if self.peek()? != byte {
            return Err(BencodeError::Malformed {
                offset: self.pos,
                reason,
            });
        }
        self.pos += 1;
        Ok(())
    }

    fn parse_int(&mut self) -> Result<i64, BencodeError> {
        let start = self.pos;
        self.pos += 1;
        let negative = self.peek()? == b'-';
        if negative {
            self.pos += 1;
        }

        let digits = self.take_digits();
        if digits.is_empty() {
            return Err(BencodeError::Malformed {
                offset: self.pos,
                reason: "integer has no digits",
            });
        }
        if digits.len() > 1 && digits[0] == b'0' {
            return Err(BencodeError::Malformed {
                offset: start,
                reason: "integer has a leading zero",
            });
        }
        if negative && digits == b"0" {
            return Err(BencodeError::Malformed {
                offset: start,
                reason: "negative zero",
            });
        }
        self.expect(b'e', "unterminated integer")?;

        // Accumulate wide, then narrow, so oversized values fail instead of wrapping.
        let mut magnitude: i128 = 0;
        for digit in digits {
            magnitude = magnitude
                .checked_mul(10)
                .and_then(|value| value.checked_add(i128::from(digit - b'0')))
                .ok_or(BencodeError::IntegerOverflow { offset: start })?;
        }
        let signed = if negative { -magnitude } else { magnitude };
        i64::try_from(signed).map_err(|_| BencodeError::IntegerOverflow { offset: start })
    }

    fn parse_bytes(&mut self) -> Result<&'a [u8], BencodeError> {
        let start = self.pos;
        let digits = self.take_digits();
        let mut length: usize = 0;
        for digit in digits {
            length = length
                .checked_mul(10)
                .and_then(|value| value.checked_add(usize::from(digit - b'0')))
                .ok_or(BencodeError::Malformed {
                    offset: start,
                    reason: "byte string length overflows",
                })?;
        }
        self.expect(b':', "byte string length not followed by ':'")?;

        let end = self
            .pos
            .checked_add(length)
            .filter(|end| *end <= self.input.len())
            .ok_or(BencodeError::Malformed {
                offset: start,
                reason: "byte string exceeds input",
            })?;
        let bytes = &self.input[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_all_primitives_with_offsets() {
        let input = b"d3:bar4:spam3:fooi-42e4:listl1:ai7eee";
        let root = decode(input).expect("valid bencode");
        let dict = root.as_dict().expect("root dictionary");
        assert_eq!(dict.len(), 3);
        assert_eq!(
            dict.get(b"bar").and_then(Node::as_bytes),
            Some(&b"spam"[..])
        );
        assert_eq!(dict.get(b"foo").and_then(Node::as_int), Some(-42));

        let list = dict.get(b"list").expect("list entry");
        assert_eq!(list.raw(), b"l1:ai7ee");
        assert_eq!(list.offset(), 28);
        assert_eq!(list.as_list().map(<[Node<'_>]>::len), Some(2));
        assert_eq!(root.raw(), &input[..]);
    }

    #[test]
    fn dictionary_keeps_declaration_order_and_unsorted_keys() {
        let root = decode(b"d1:zi1e1:ai2e1:mi3ee").expect("valid bencode");
        let keys: Vec<&[u8]> = root
            .as_dict()
            .expect("dictionary")
            .iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(keys, vec![&b"z"[..], &b"a"[..], &b"m"[..]]);
    }

    #[test]
    fn rejects_trailing_garbage_after_root() {
        let err = decode(b"de0:").expect_err("trailing bytes");
        assert_eq!(err, BencodeError::TrailingData { offset: 2 });

        let (node, consumed) = decode_prefix(b"i1eXYZ").expect("prefix decodes");
        assert_eq!(node.as_int(), Some(1));
        assert_eq!(consumed, 3);
    }

    #[test]
    fn truncated_input_reports_offset() {
        let err = decode(b"d4:infod4:name3:ab").expect_err("truncated");
        assert!(matches!(
            err,
            BencodeError::Malformed {
                offset: 14,
                reason: "byte string exceeds input"
            }
        ));

        let err = decode(b"l").expect_err("unterminated list");
        assert_eq!(err.offset(), 1);
    }

    #[test]
    fn integer_narrowing_overflow_is_an_error() {
        assert_eq!(
            decode(b"i9223372036854775807e").expect("max").as_int(),
            Some(i64::MAX)
        );
        assert_eq!(
            decode(b"i-9223372036854775808e").expect("min").as_int(),
            Some(i64::MIN)
        );
        assert_eq!(
            decode(b"i9223372036854775808e").expect_err("overflow"),
            BencodeError::IntegerOverflow { offset: 0 }
        );
        assert_eq!(
            decode(b"i99999999999999999999999999999999999999999999e").expect_err("huge"),
            BencodeError::IntegerOverflow { offset: 0 }
        );
    }

    #[test]
    fn rejects_non_canonical_integers_and_bad_keys() {
        assert!(decode(b"i03e").is_err());
        assert!(decode(b"i-0e").is_err());
        assert!(decode(b"ie").is_err());
        assert!(decode(b"i12").is_err());
        let err = decode(b"di1ei2ee").expect_err("integer key");
        assert!(matches!(
            err,
            BencodeError::Malformed {
                offset: 1,
                reason: "dictionary key is not a byte string"
            }
        ));
    }

    #[test]
    fn nesting_limit_guards_hostile_input() {
        let mut input = vec![b'l'; MAX_DEPTH + 1];
        input.extend(std::iter::repeat_n(b'e', MAX_DEPTH + 1));
        let err = decode(&input).expect_err("too deep");
        assert_eq!(err, BencodeError::TooDeep { offset: MAX_DEPTH });

        let mut ok = vec![b'l'; MAX_DEPTH];
        ok.extend(std::iter::repeat_n(b'e', MAX_DEPTH));
        assert!(decode(&ok).is_ok());
    }

    #[test]
    fn huge_declared_string_length_does_not_panic() {
        let err = decode(b"99999999999999999999999999:x").expect_err("overflowing length");
        assert_eq!(err.offset(), 0);
    }
}
