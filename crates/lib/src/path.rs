//! Slash-delimited document paths.
//!
//! A [`Path`] is an ordered list of segments addressing a document in the
//! store. Parsing follows the same normalization rules everywhere in the
//! crate:
//!
//! - Segments are separated by `/`
//! - Empty segments are dropped, so leading, trailing and repeated slashes are
//!   ignored
//! - The empty string (or `"/"`) is the root path
//!
//! ```rust
//! use livetree::Path;
//!
//! let path: Path = "/users//eugene/".parse()?;
//! assert_eq!(path.segments(), ["users", "eugene"]);
//! assert!(Path::root().is_root());
//! # Ok::<(), livetree::PathError>(())
//! ```

use std::{fmt, str::FromStr};

use thiserror::Error;

/// Separator between path segments.
pub const SEPARATOR: char = '/';

/// Errors produced when building paths or decoding stored keys.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    /// A segment added programmatically is not addressable by a path string.
    #[error("Invalid segment '{segment}': {reason}")]
    InvalidSegment { segment: String, reason: String },

    /// A stored key is not a valid path encoding.
    #[error("Malformed key {key}: {reason}")]
    MalformedKey {
        /// Hex rendering of the offending key
        key: String,
        reason: String,
    },
}

impl PathError {
    /// Check if this error came from decoding a stored key.
    pub fn is_malformed_key(&self) -> bool {
        matches!(self, PathError::MalformedKey { .. })
    }
}

/// An owned, normalized document path.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// The root path, addressing the whole store.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse a path string. Never fails; see the module docs for the rules.
    pub fn parse(input: &str) -> Self {
        Self {
            segments: input
                .split(SEPARATOR)
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Builds a path from raw segments, validating each of them.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut path = Self::root();
        for segment in segments {
            path.push(segment)?;
        }
        Ok(path)
    }

    /// Builds a path from segments already known to be valid (decoded keys).
    pub(crate) fn from_raw(segments: Vec<String>) -> Self {
        Self { segments }
    }

    /// Appends a segment in place.
    pub fn push(&mut self, segment: impl Into<String>) -> Result<(), PathError> {
        let segment = segment.into();
        validate_segment(&segment)?;
        self.segments.push(segment);
        Ok(())
    }

    /// Returns a new path with `segment` appended.
    pub fn child(&self, segment: impl Into<String>) -> Result<Self, PathError> {
        let mut child = self.clone();
        child.push(segment)?;
        Ok(child)
    }

    /// Returns the parent path, or `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, parent) = self.segments.split_last()?;
        Some(Self {
            segments: parent.to_vec(),
        })
    }

    /// All proper ancestors, from the root down to the parent.
    pub fn ancestors(&self) -> impl Iterator<Item = Path> + '_ {
        (0..self.segments.len()).map(|len| Self {
            segments: self.segments[..len].to_vec(),
        })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Last segment, or `None` for the root.
    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Check if `self` equals `other` or lies beneath it.
    pub fn starts_with(&self, other: &Path) -> bool {
        self.segments.starts_with(&other.segments)
    }

    /// Segments of `self` below `base`, or `None` when `self` is not under `base`.
    pub fn strip_prefix(&self, base: &Path) -> Option<&[String]> {
        self.segments.strip_prefix(base.segments.as_slice())
    }
}

fn validate_segment(segment: &str) -> Result<(), PathError> {
    if segment.is_empty() {
        return Err(PathError::InvalidSegment {
            segment: segment.to_string(),
            reason: "segments cannot be empty".to_string(),
        });
    }
    if segment.contains(SEPARATOR) {
        return Err(PathError::InvalidSegment {
            segment: segment.to_string(),
            reason: "segments cannot contain '/'".to_string(),
        });
    }
    Ok(())
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for Path {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}
