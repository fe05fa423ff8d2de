//! Order-preserving key encoding for paths.
//!
//! Every segment is written as its UTF-8 bytes followed by a `0x00`
//! terminator. Bytes `0x00` and `0x01` inside a segment are escaped as
//! `0x01 0x01` and `0x01 0x02`, which keeps the byte order of escaped
//! segments identical to the order of the raw segments.
//!
//! Because the encoding of a path is a byte prefix of the encoding of each of
//! its descendants, and the terminator sorts below every content byte, the
//! keys of a sub-tree always form one contiguous range:
//!
//! ```text
//! a        61 00
//! a/b      61 00 62 00
//! a/b/c    61 00 62 00 63 00
//! ab       61 62 00
//! ```
//!
//! `0xFF` never occurs in UTF-8, so `enc(path) + 0xFF` is an exclusive upper
//! bound for everything under `path`.

use std::{fmt, ops::Deref};

use crate::path::{Path, PathError};

const TERMINATOR: u8 = 0x00;
const ESCAPE: u8 = 0x01;
const RANGE_START: u8 = 0x00;
const RANGE_END: u8 = 0xFF;

/// An encoded path, as stored in the underlying engine.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Vec<u8>);

impl Key {
    /// Encodes `path`. The root path encodes to the empty key.
    pub fn encode(path: &Path) -> Self {
        let mut bytes = Vec::with_capacity(path.segments().iter().map(|s| s.len() + 1).sum());
        for segment in path.segments() {
            for &byte in segment.as_bytes() {
                match byte {
                    0x00 => bytes.extend_from_slice(&[ESCAPE, 0x01]),
                    0x01 => bytes.extend_from_slice(&[ESCAPE, 0x02]),
                    other => bytes.push(other),
                }
            }
            bytes.push(TERMINATOR);
        }
        Self(bytes)
    }

    /// Decodes stored key bytes back into a path.
    pub fn decode(bytes: &[u8]) -> Result<Path, PathError> {
        let malformed = |reason: &str| PathError::MalformedKey {
            key: hex::encode(bytes),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut current = Vec::new();
        let mut iter = bytes.iter();
        while let Some(&byte) = iter.next() {
            match byte {
                TERMINATOR => {
                    let segment = String::from_utf8(std::mem::take(&mut current))
                        .map_err(|_| malformed("segment is not valid UTF-8"))?;
                    segments.push(segment);
                }
                ESCAPE => match iter.next() {
                    Some(0x01) => current.push(0x00),
                    Some(0x02) => current.push(0x01),
                    _ => return Err(malformed("invalid escape sequence")),
                },
                other => current.push(other),
            }
        }
        if !current.is_empty() {
            return Err(malformed("unterminated segment"));
        }
        Ok(Path::from_raw(segments))
    }

    /// Range of keys strictly below `path`, excluding `path` itself.
    pub fn descendants(path: &Path) -> KeyRange {
        let base = Self::encode(path).0;
        KeyRange {
            start: with_suffix(&base, RANGE_START),
            end: with_suffix(&base, RANGE_END),
        }
    }

    /// Range of keys at or below `path`.
    pub fn subtree(path: &Path) -> KeyRange {
        let base = Self::encode(path).0;
        KeyRange {
            end: with_suffix(&base, RANGE_END),
            start: base,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

fn with_suffix(base: &[u8], byte: u8) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(base.len() + 1);
    bytes.extend_from_slice(base);
    bytes.push(byte);
    bytes
}

impl Deref for Key {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Key> for Vec<u8> {
    fn from(key: Key) -> Self {
        key.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Self::decode(&self.0) {
            Ok(path) => write!(f, "Key({path})"),
            Err(_) => write!(f, "Key(0x{})", hex::encode(&self.0)),
        }
    }
}

/// A half-open `[start, end)` interval of encoded keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
}

impl KeyRange {
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && key < self.end.as_slice()
    }
}
