//! Ordered key-value engines.
//!
//! The document store never touches storage directly. Everything goes through
//! the [`Backend`] trait, which models a flat, byte-ordered key-value engine
//! with four capabilities:
//!
//! - point lookups,
//! - atomic batches of puts and deletes,
//! - ordered range scans,
//! - a change feed publishing every committed write in commit order.
//!
//! Every committed write is numbered. A [`Backend::snapshot`] reports the
//! number of the last write it reflects, so a reader that also follows the
//! feed can tell which changes it has already seen.
//!
//! [`database::InMemory`] is the bundled implementation.

use std::any::Any;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;
use crate::key::KeyRange;

pub mod database;
pub mod errors;

pub use errors::BackendError;

/// A single write against the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Put { key: Vec<u8>, value: Vec<u8> },
    Del { key: Vec<u8> },
}

impl Mutation {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Mutation::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn del(key: impl Into<Vec<u8>>) -> Self {
        Mutation::Del { key: key.into() }
    }

    pub fn key(&self) -> &[u8] {
        match self {
            Mutation::Put { key, .. } | Mutation::Del { key } => key,
        }
    }

    pub fn is_put(&self) -> bool {
        matches!(self, Mutation::Put { .. })
    }
}

/// A committed write as published on the change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Put { key: Vec<u8>, value: Vec<u8> },
    Del { key: Vec<u8> },
    Batch(Vec<Mutation>),
}

impl ChangeEvent {
    /// The mutations this event committed, in order.
    pub fn into_mutations(self) -> Vec<Mutation> {
        match self {
            ChangeEvent::Put { key, value } => vec![Mutation::Put { key, value }],
            ChangeEvent::Del { key } => vec![Mutation::Del { key }],
            ChangeEvent::Batch(mutations) => mutations,
        }
    }
}

/// A [`ChangeEvent`] tagged with its commit sequence number.
///
/// Sequence numbers start at 1 and grow by one with every committed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub sequence: u64,
    pub event: ChangeEvent,
}

/// Rows of a range scan.
pub type Rows = Vec<(Vec<u8>, Vec<u8>)>;

/// Receiving end of a change feed subscription.
///
/// Changes arrive in commit order and are never dropped. The feed ends when
/// the engine is dropped.
pub type ChangeFeed = mpsc::UnboundedReceiver<Change>;

/// Ordered key-value engine abstraction.
///
/// All implementations must be `Send` and `Sync` to allow sharing across tasks,
/// and implement `Any` to allow for downcasting (e.g. to persist an
/// [`database::InMemory`] engine on shutdown).
#[async_trait]
pub trait Backend: Send + Sync + Any {
    /// Retrieves the value stored under `key`.
    ///
    /// # Returns
    /// The stored bytes, or [`BackendError::KeyNotFound`] when nothing is stored.
    async fn get(&self, key: &[u8]) -> Result<Vec<u8>>;

    /// Stores a single value and publishes [`ChangeEvent::Put`].
    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()>;

    /// Removes a single key and publishes [`ChangeEvent::Del`].
    ///
    /// Deleting an absent key succeeds.
    async fn delete(&self, key: Vec<u8>) -> Result<()>;

    /// Applies all mutations atomically, in order, and publishes one
    /// [`ChangeEvent::Batch`].
    ///
    /// Either every mutation is applied or none is.
    async fn batch(&self, mutations: Vec<Mutation>) -> Result<()>;

    /// Returns every `(key, value)` pair inside `range`, in key order.
    ///
    /// Each call starts a fresh scan over the current state.
    async fn scan(&self, range: &KeyRange) -> Result<Rows>;

    /// Like [`Backend::scan`], but also returns the sequence number of the
    /// last committed write the rows reflect (0 before any write).
    ///
    /// The rows and the number come from one consistent view: every change on
    /// the feed with a greater number was committed after the rows were read.
    async fn snapshot(&self, range: &KeyRange) -> Result<(u64, Rows)>;

    /// Subscribes to the change feed.
    fn subscribe(&self) -> ChangeFeed;

    /// Returns a reference to the backend instance as a dynamic `Any` type.
    fn as_any(&self) -> &dyn Any;
}
