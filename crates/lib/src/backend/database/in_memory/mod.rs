//! In-memory engine implementation
//!
//! This module provides an in-memory implementation of the [`Backend`] trait,
//! suitable for testing, development, or single-process deployments that
//! persist by saving the whole state to a JSON file.

mod persistence;
mod storage;

use std::{
    any::Any,
    collections::BTreeMap,
    path::Path,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use tokio::sync::{RwLock, mpsc};

use crate::Result;
use crate::backend::{Backend, Change, ChangeEvent, ChangeFeed, Mutation, Rows};
use crate::key::KeyRange;

/// Ordered key-value storage.
pub(crate) type Entries = BTreeMap<Vec<u8>, Vec<u8>>;

/// A `BTreeMap`-backed ordered key-value engine with a change feed.
///
/// Writers hold the entry lock while they publish their change, so every
/// subscriber observes changes in exactly the order they were committed.
/// Subscribers use unbounded channels; a slow subscriber delays nobody and
/// misses nothing.
#[derive(Debug, Default)]
pub struct InMemory {
    /// Entries storage with read-write lock for concurrent access
    pub(crate) entries: RwLock<Entries>,
    /// Sequence number of the last committed write; only advanced under the
    /// entry write lock
    sequence: AtomicU64,
    /// Live change feed subscribers, pruned when their receiver is dropped
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Change>>>,
}

impl InMemory {
    /// Creates a new, empty `InMemory` engine.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_entries(entries: Entries) -> Self {
        Self {
            entries: RwLock::new(entries),
            sequence: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Number of live change feed subscribers.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }

    /// Saves the entire engine state to a specified file as JSON.
    ///
    /// # Arguments
    /// * `path` - The path to the file where the state should be saved.
    ///
    /// # Returns
    /// A `Result` indicating success or an I/O or serialization error.
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        persistence::save_to_file(self, path).await
    }

    /// Loads the engine state from a specified JSON file.
    ///
    /// If the file does not exist, a new, empty `InMemory` engine is returned.
    ///
    /// # Arguments
    /// * `path` - The path to the file from which to load the state.
    ///
    /// # Returns
    /// A `Result` containing the loaded `InMemory` engine or an I/O or deserialization error.
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        persistence::load_from_file(path).await
    }

    /// Numbers a committed change and publishes it to every live subscriber.
    ///
    /// Must be called while the entry write lock is held.
    pub(crate) fn publish(&self, event: ChangeEvent) {
        let change = Change {
            sequence: self.sequence.fetch_add(1, Ordering::AcqRel) + 1,
            event,
        };
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| tx.send(change.clone()).is_ok());
    }

    /// Sequence number of the last committed write.
    ///
    /// Only meaningful while the entry lock is held.
    pub(crate) fn sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Backend for InMemory {
    async fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        storage::get(self, key).await
    }

    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        storage::put(self, key, value).await
    }

    async fn delete(&self, key: Vec<u8>) -> Result<()> {
        storage::delete(self, key).await
    }

    async fn batch(&self, mutations: Vec<Mutation>) -> Result<()> {
        storage::batch(self, mutations).await
    }

    async fn scan(&self, range: &KeyRange) -> Result<Rows> {
        storage::scan(self, range).await
    }

    async fn snapshot(&self, range: &KeyRange) -> Result<(u64, Rows)> {
        storage::snapshot(self, range).await
    }

    fn subscribe(&self) -> ChangeFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
