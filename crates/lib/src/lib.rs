//! Livetree: a hierarchical JSON document store with live subscriptions.
//!
//! Documents are addressed by slash-separated paths and stored as flat leaves
//! in an ordered key-value engine. Any sub-tree can be read back as a whole,
//! overwritten atomically, or watched for changes.
//!
//! ## Core Concepts
//!
//! * **Paths (`path::Path`)**: Sequences of segments such as `users/eugene/name`.
//! * **Keys (`key::Key`)**: The order-preserving byte encoding of a path; every
//!   sub-tree occupies one contiguous key range.
//! * **Documents (`document::Document`)**: A scalar or a composite of named
//!   children. Only scalar leaves are stored.
//! * **Backends (`backend::Backend`)**: The pluggable ordered key-value engine
//!   with atomic batches, range scans and a change feed.
//! * **Store (`store::Store`)**: The facade for `put`, `get`, `push`, `delete`
//!   and `watch`.
//! * **Watches (`watch::Watch`)**: Live subscriptions emitting `value`,
//!   `child_added`, `child_changed` and `child_removed` events.

pub mod backend;
pub mod clock;
pub mod document;
pub mod key;
pub mod path;
pub mod push_id;
pub mod store;
pub mod tree;
pub mod watch;

pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "testing"))]
pub use clock::FixedClock;
pub use document::{Document, Scalar};
pub use key::{Key, KeyRange};
pub use path::{Path, PathError};
pub use store::Store;
pub use watch::{Watch, WatchEvent, WatchHandle, WatchState};

/// Result type used throughout the Livetree library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Livetree library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured engine errors from the backend module
    #[error(transparent)]
    Backend(backend::BackendError),

    /// Invalid paths and undecodable keys
    #[error(transparent)]
    Path(#[from] PathError),

    /// A concurrent lookup task panicked or was cancelled
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Backend(_) => "backend",
            Error::Path(_) => "path",
            Error::Task(_) => "task",
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error is engine-related.
    pub fn is_backend_error(&self) -> bool {
        matches!(self, Error::Backend(_))
    }

    /// Check if this error indicates stored data could not be decoded.
    pub fn is_integrity_error(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_integrity_error(),
            Error::Path(path_err) => path_err.is_malformed_key(),
            _ => false,
        }
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        match self {
            Error::Io(_) => true,
            Error::Backend(backend_err) => backend_err.is_io_error(),
            _ => false,
        }
    }

    /// Check if this error comes from encoding or decoding JSON or paths.
    pub fn is_encoding_error(&self) -> bool {
        matches!(self, Error::Serialize(_) | Error::Path(_))
    }

    /// Check if this error means the engine's change feed has gone away.
    pub fn is_feed_error(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_feed_error(),
            _ => false,
        }
    }
}
