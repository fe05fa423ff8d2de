//! Read and write operations for the InMemory engine

use std::ops::Bound;

use tracing::trace;

use super::{Entries, InMemory};
use crate::{
    Result,
    backend::{ChangeEvent, Mutation, Rows, errors::BackendError},
    key::KeyRange,
};

pub(crate) async fn get(backend: &InMemory, key: &[u8]) -> Result<Vec<u8>> {
    backend
        .entries
        .read()
        .await
        .get(key)
        .cloned()
        .ok_or_else(|| BackendError::key_not_found(key).into())
}

pub(crate) async fn put(backend: &InMemory, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
    let mut entries = backend.entries.write().await;
    entries.insert(key.clone(), value.clone());
    backend.publish(ChangeEvent::Put { key, value });
    Ok(())
}

pub(crate) async fn delete(backend: &InMemory, key: Vec<u8>) -> Result<()> {
    let mut entries = backend.entries.write().await;
    entries.remove(&key);
    backend.publish(ChangeEvent::Del { key });
    Ok(())
}

/// Applies the batch under a single write lock acquisition, so readers see
/// either none or all of it.
pub(crate) async fn batch(backend: &InMemory, mutations: Vec<Mutation>) -> Result<()> {
    let mut entries = backend.entries.write().await;
    for mutation in &mutations {
        match mutation {
            Mutation::Put { key, value } => {
                entries.insert(key.clone(), value.clone());
            }
            Mutation::Del { key } => {
                entries.remove(key);
            }
        }
    }
    trace!(count = mutations.len(), "applied batch");
    backend.publish(ChangeEvent::Batch(mutations));
    Ok(())
}

pub(crate) async fn scan(backend: &InMemory, range: &KeyRange) -> Result<Rows> {
    let entries = backend.entries.read().await;
    Ok(collect_range(&entries, range))
}

/// Scans under the read lock, so no write can land between the rows and the
/// sequence number.
pub(crate) async fn snapshot(backend: &InMemory, range: &KeyRange) -> Result<(u64, Rows)> {
    let entries = backend.entries.read().await;
    Ok((backend.sequence(), collect_range(&entries, range)))
}

fn collect_range(entries: &Entries, range: &KeyRange) -> Rows {
    if range.start >= range.end {
        return Vec::new();
    }
    entries
        .range::<[u8], _>((
            Bound::Included(range.start.as_slice()),
            Bound::Excluded(range.end.as_slice()),
        ))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
