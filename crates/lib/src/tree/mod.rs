//! Mapping between documents and flat key-value pairs.
//!
//! [`writer`] turns a document write into the batch of engine mutations that
//! stores it, and [`reader`] folds stored leaves back into a document. Both
//! share the leaf value codec defined here: a scalar leaf is stored as its
//! JSON text.

pub mod reader;
pub mod writer;

use crate::{
    Result,
    backend::BackendError,
    document::{Document, Scalar},
    key::Key,
    path::Path,
};

pub use reader::{read, read_at};
pub use writer::{plan_delete, plan_put};

/// Encodes a scalar leaf for storage.
pub(crate) fn encode_scalar(scalar: &Scalar) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&scalar.to_json())?)
}

/// Decodes a stored leaf. `path` is only used for error reporting.
pub(crate) fn decode_scalar(path: &Path, bytes: &[u8]) -> Result<Document> {
    let value: serde_json::Value =
        serde_json::from_slice(bytes).map_err(|e| BackendError::CorruptValue {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
    Scalar::from_json(value)
        .map(Document::Scalar)
        .ok_or_else(|| {
            BackendError::CorruptValue {
                path: path.to_string(),
                reason: "leaf holds a composite value".to_string(),
            }
            .into()
        })
}

/// Decodes a stored key, reporting failures as engine corruption.
pub(crate) fn decode_key(bytes: &[u8]) -> Result<Path> {
    Key::decode(bytes).map_err(|e| {
        BackendError::CorruptKey {
            key: hex::encode(bytes),
            reason: e.to_string(),
        }
        .into()
    })
}
