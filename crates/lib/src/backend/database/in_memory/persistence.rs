//! Persistence operations for the InMemory engine
//!
//! This module handles serialization and file I/O for saving/loading
//! the in-memory engine state to/from JSON files. Keys and values are raw
//! bytes, so both are written hex-encoded.

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};

use super::{Entries, InMemory};
use crate::{Error, Result, backend::errors::BackendError};

/// The current persistence file format version.
/// v0 indicates this is an unstable format subject to breaking changes.
const PERSISTENCE_VERSION: u8 = 0;

/// Helper to check if version is default (0) for serde skip_serializing_if
fn is_v0(v: &u8) -> bool {
    *v == 0
}

/// Serializable version of the InMemory engine for persistence
#[derive(Serialize, Deserialize)]
struct SerializableDatabase {
    /// File format version for compatibility checking
    #[serde(rename = "_v", default, skip_serializing_if = "is_v0")]
    version: u8,
    /// hex(key) -> hex(value)
    entries: BTreeMap<String, String>,
}

/// Saves the entire engine state to a specified file as JSON.
pub(crate) async fn save_to_file<P: AsRef<Path>>(backend: &InMemory, path: P) -> Result<()> {
    let entries = backend
        .entries
        .read()
        .await
        .iter()
        .map(|(k, v)| (hex::encode(k), hex::encode(v)))
        .collect();

    let serializable = SerializableDatabase {
        version: PERSISTENCE_VERSION,
        entries,
    };

    let json = serde_json::to_string_pretty(&serializable)
        .map_err(|e| -> Error { BackendError::SerializationFailed { source: e }.into() })?;
    tokio::fs::write(path, json)
        .await
        .map_err(|e| -> Error { BackendError::FileIo { source: e }.into() })
}

/// Loads the engine state from a specified JSON file.
///
/// If the file does not exist, a new, empty `InMemory` engine is returned.
pub(crate) async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<InMemory> {
    let json = match tokio::fs::read_to_string(path).await {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(InMemory::new()),
        Err(e) => return Err(BackendError::FileIo { source: e }.into()),
    };

    let serializable: SerializableDatabase = serde_json::from_str(&json)
        .map_err(|e| -> Error { BackendError::DeserializationFailed { source: e }.into() })?;
    if serializable.version != PERSISTENCE_VERSION {
        return Err(BackendError::UnsupportedVersion {
            found: serializable.version,
            supported: PERSISTENCE_VERSION,
        }
        .into());
    }

    let mut entries = Entries::new();
    for (key, value) in serializable.entries {
        let decoded_key = hex::decode(&key).map_err(|e| BackendError::CorruptKey {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        let decoded_value = hex::decode(&value).map_err(|e| BackendError::CorruptValue {
            path: key.clone(),
            reason: e.to_string(),
        })?;
        entries.insert(decoded_key, decoded_value);
    }
    Ok(InMemory::from_entries(entries))
}
