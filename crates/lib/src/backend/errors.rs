//! Error types for the key-value backend.
//!
//! This module defines structured error types for engine operations,
//! providing better error context and type safety compared to string-based errors.

use thiserror::Error;

/// Errors that can occur during backend operations.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Existing variants will not be removed in minor versions
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BackendError {
    /// No value is stored under the key.
    #[error("Key not found: {key}")]
    KeyNotFound {
        /// Hex rendering of the key
        key: String,
    },

    /// A stored key could not be decoded as a path.
    #[error("Corrupt key {key}: {reason}")]
    CorruptKey {
        /// Hex rendering of the key
        key: String,
        /// Why decoding failed
        reason: String,
    },

    /// A stored value could not be decoded as a scalar.
    #[error("Corrupt value at {path}: {reason}")]
    CorruptValue {
        /// The path whose value is corrupt
        path: String,
        /// Why decoding failed
        reason: String,
    },

    /// Serialization failed.
    #[error("Serialization failed")]
    SerializationFailed {
        /// The underlying serialization error
        #[source]
        source: serde_json::Error,
    },

    /// Deserialization failed.
    #[error("Deserialization failed")]
    DeserializationFailed {
        /// The underlying deserialization error
        #[source]
        source: serde_json::Error,
    },

    /// File I/O error.
    #[error("File I/O error")]
    FileIo {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Persisted state uses a format this version cannot read.
    #[error("Unsupported persistence version {found}; only version {supported} is supported")]
    UnsupportedVersion { found: u8, supported: u8 },

    /// The change feed stopped delivering events.
    #[error("Change feed closed")]
    FeedClosed,
}

impl BackendError {
    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BackendError::KeyNotFound { .. })
    }

    /// Check if this error indicates stored data could not be decoded.
    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            BackendError::CorruptKey { .. } | BackendError::CorruptValue { .. }
        )
    }

    /// Check if this error is related to I/O operations.
    pub fn is_io_error(&self) -> bool {
        matches!(
            self,
            BackendError::FileIo { .. }
                | BackendError::SerializationFailed { .. }
                | BackendError::DeserializationFailed { .. }
                | BackendError::UnsupportedVersion { .. }
        )
    }

    /// Check if this error came from the change feed.
    pub fn is_feed_error(&self) -> bool {
        matches!(self, BackendError::FeedClosed)
    }

    pub(crate) fn key_not_found(key: &[u8]) -> Self {
        BackendError::KeyNotFound {
            key: hex::encode(key),
        }
    }
}

impl From<BackendError> for crate::Error {
    fn from(err: BackendError) -> Self {
        crate::Error::Backend(err)
    }
}
