//! Snapshot maintenance and child-level diffing for watches.

use crate::{
    Result,
    backend::Mutation,
    document::{Children, Document},
    path::Path,
    tree::{decode_key, decode_scalar},
};

use super::WatchEvent;

/// Applies one committed mutation to the snapshot of the sub-tree at `base`.
///
/// Mutations outside `base` are ignored. Deleting a leaf that is not present
/// is a no-op, and composites emptied by a delete disappear, exactly as they
/// would on a fresh read.
pub(crate) fn apply(snapshot: &mut Option<Document>, base: &Path, mutation: &Mutation) -> Result<()> {
    let leaf_path = decode_key(mutation.key())?;
    let Some(relative) = leaf_path.strip_prefix(base) else {
        return Ok(());
    };

    match mutation {
        Mutation::Put { value, .. } => {
            let leaf = decode_scalar(&leaf_path, value)?;
            snapshot
                .get_or_insert_with(Document::empty)
                .insert_at(relative, leaf);
        }
        Mutation::Del { .. } if relative.is_empty() => {
            // The watched path's own leaf; a composite has none.
            if snapshot.as_ref().is_some_and(Document::is_scalar) {
                *snapshot = None;
            }
        }
        Mutation::Del { .. } => {
            if let Some(document) = snapshot {
                document.remove_at(relative);
                if document.is_empty() {
                    *snapshot = None;
                }
            }
        }
    }
    Ok(())
}

/// Events describing the change from `old` to `new`.
///
/// Direct children are compared as three disjoint sets, so a batch that adds,
/// changes and removes children at once reports all of it: removals first,
/// then additions, then changes. The full `value` always comes last, even when
/// nothing changed.
pub(crate) fn diff(old: Option<&Document>, new: Option<&Document>) -> Vec<WatchEvent> {
    let empty = Children::new();
    let old_children = old.and_then(Document::children).unwrap_or(&empty);
    let new_children = new.and_then(Document::children).unwrap_or(&empty);

    let mut events = Vec::new();
    for (key, value) in old_children {
        if !new_children.contains_key(key) {
            events.push(WatchEvent::ChildRemoved {
                key: key.clone(),
                value: value.clone(),
            });
        }
    }
    for (key, value) in new_children {
        if !old_children.contains_key(key) {
            events.push(WatchEvent::ChildAdded {
                key: key.clone(),
                value: value.clone(),
            });
        }
    }
    for (key, value) in new_children {
        if old_children.get(key).is_some_and(|previous| previous != value) {
            events.push(WatchEvent::ChildChanged {
                key: key.clone(),
                value: value.clone(),
            });
        }
    }
    events.push(WatchEvent::Value(new.cloned()));
    events
}
