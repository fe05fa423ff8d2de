//! Rebuilds documents from stored leaves.

use tracing::debug;

use crate::{
    Result,
    backend::{Backend, Rows},
    document::Document,
    key::Key,
    path::Path,
};

use super::{decode_key, decode_scalar};

/// Reads the document stored at `path`.
///
/// A leaf stored exactly at `path` wins. Otherwise every leaf below `path` is
/// folded into a composite by its full relative path, so the result does not
/// depend on the order the scan returns leaves in.
///
/// Returns `Ok(None)` when nothing is stored at or below `path`.
pub async fn read(backend: &dyn Backend, path: &Path) -> Result<Option<Document>> {
    match backend.get(&Key::encode(path)).await {
        Ok(bytes) => return decode_scalar(path, &bytes).map(Some),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e),
    }

    let rows = backend.scan(&Key::descendants(path)).await?;
    fold(path, &rows)
}

/// Reads the document at `path` from one consistent engine view and returns
/// it with the sequence number of the last write it reflects.
///
/// Same result as [`read`], but the whole sub-tree comes from a single
/// [`Backend::snapshot`], so changes numbered above the returned sequence are
/// exactly the ones the document does not contain yet.
pub async fn read_at(backend: &dyn Backend, path: &Path) -> Result<(u64, Option<Document>)> {
    let own = Key::encode(path);
    let (sequence, rows) = backend.snapshot(&Key::subtree(path)).await?;
    // The own leaf sorts before every descendant.
    let document = match rows.first() {
        Some((key, value)) if key.as_slice() == own.as_bytes() => {
            Some(decode_scalar(path, value)?)
        }
        _ => fold(path, &rows)?,
    };
    Ok((sequence, document))
}

fn fold(path: &Path, rows: &Rows) -> Result<Option<Document>> {
    if rows.is_empty() {
        debug!(%path, "not found");
        return Ok(None);
    }

    let mut document = Document::empty();
    for (key, value) in rows {
        let leaf_path = decode_key(key)?;
        let leaf = decode_scalar(&leaf_path, value)?;
        let Some(relative) = leaf_path.strip_prefix(path) else {
            continue;
        };
        document.insert_at(relative, leaf);
    }
    debug!(%path, leaves = rows.len(), "folded composite");
    Ok(Some(document))
}
