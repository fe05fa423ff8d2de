//! Plans the engine mutations for document writes.
//!
//! Overwrites are total: storing a document at a path first deletes every leaf
//! that could otherwise survive and shadow it.
//!
//! - every key under the path (shrinking or replacing a composite),
//! - the leaf at the path itself when a composite replaces a scalar,
//! - leaves at ancestor paths, which a write beneath a scalar replaces.
//!
//! Plans list every delete before any put and are meant to be committed as
//! one atomic batch.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::debug;

use crate::{
    Result,
    backend::{Backend, Mutation},
    document::Document,
    key::Key,
    path::Path,
};

use super::encode_scalar;

/// Plans storing `document` at `path`.
pub async fn plan_put(
    backend: &Arc<dyn Backend>,
    path: &Path,
    document: &Document,
) -> Result<Vec<Mutation>> {
    let own_leaf = async {
        if document.is_scalar() {
            // The put below overwrites it.
            Ok(None)
        } else {
            existing_leaf(backend.as_ref(), Key::encode(path)).await
        }
    };
    let (ancestors, own_leaf, descendants) = tokio::try_join!(
        ancestor_leaves(backend, path),
        own_leaf,
        descendant_keys(backend.as_ref(), path),
    )?;

    let mut mutations: Vec<Mutation> = ancestors
        .into_iter()
        .chain(own_leaf)
        .chain(descendants)
        .map(Mutation::del)
        .collect();
    let deletes = mutations.len();

    for (relative, scalar) in document.leaves() {
        let mut leaf_path = path.clone();
        for segment in relative {
            leaf_path.push(segment)?;
        }
        mutations.push(Mutation::put(Key::encode(&leaf_path), encode_scalar(scalar)?));
    }

    debug!(
        %path,
        deletes,
        puts = mutations.len() - deletes,
        "planned put"
    );
    Ok(mutations)
}

/// Plans deleting `path` and everything beneath it.
///
/// Returns an empty plan when nothing is stored there.
pub async fn plan_delete(backend: &Arc<dyn Backend>, path: &Path) -> Result<Vec<Mutation>> {
    let (own_leaf, descendants) = tokio::try_join!(
        existing_leaf(backend.as_ref(), Key::encode(path)),
        descendant_keys(backend.as_ref(), path),
    )?;
    let mutations: Vec<Mutation> = own_leaf
        .into_iter()
        .chain(descendants)
        .map(Mutation::del)
        .collect();
    debug!(%path, deletes = mutations.len(), "planned delete");
    Ok(mutations)
}

/// Keys of every leaf stored strictly below `path`.
async fn descendant_keys(backend: &dyn Backend, path: &Path) -> Result<Vec<Vec<u8>>> {
    let rows = backend.scan(&Key::descendants(path)).await?;
    Ok(rows.into_iter().map(|(key, _)| key).collect())
}

/// `Some(key)` when a leaf is stored under `key`.
async fn existing_leaf(backend: &dyn Backend, key: Key) -> Result<Option<Vec<u8>>> {
    match backend.get(&key).await {
        Ok(_) => Ok(Some(key.into_bytes())),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Keys of leaves stored at proper ancestors of `path`, shallowest first.
///
/// One lookup task per ancestor, all joined before returning.
async fn ancestor_leaves(backend: &Arc<dyn Backend>, path: &Path) -> Result<Vec<Vec<u8>>> {
    let mut lookups = JoinSet::new();
    for ancestor in path.ancestors() {
        let backend = Arc::clone(backend);
        lookups.spawn(async move { existing_leaf(backend.as_ref(), Key::encode(&ancestor)).await });
    }

    let mut found = Vec::new();
    while let Some(joined) = lookups.join_next().await {
        if let Some(key) = joined?? {
            found.push(key);
        }
    }
    // Ancestor keys are prefixes of each other, so byte order is depth order.
    found.sort();
    Ok(found)
}
