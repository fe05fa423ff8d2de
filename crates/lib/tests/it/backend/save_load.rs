use tempfile::TempDir;

use livetree::{Store, backend::database::InMemory};
use serde_json::json;

use crate::helpers::get_json;

#[tokio::test]
async fn test_store_survives_save_and_load() {
    let dir = TempDir::new().unwrap();
    let file_path = dir.path().join("livetree.json");

    {
        let store = Store::new(Box::new(InMemory::new()));
        store
            .put("users/eugene", json!({"name": "Eugene", "tags": ["a", "b"]}))
            .await
            .unwrap();
        store.put("counter", 7i64).await.unwrap();

        let backend = store
            .backend()
            .as_any()
            .downcast_ref::<InMemory>()
            .expect("store should use the in-memory engine");
        backend.save_to_file(&file_path).await.unwrap();
    }

    assert!(file_path.exists());

    let loaded = InMemory::load_from_file(&file_path).await.unwrap();
    let store = Store::new(Box::new(loaded));
    assert_eq!(
        get_json(&store, "users/eugene").await,
        Some(json!({"name": "Eugene", "tags": ["a", "b"]}))
    );
    assert_eq!(get_json(&store, "counter").await, Some(json!(7)));
}

#[tokio::test]
async fn test_load_non_existent_file() {
    let dir = TempDir::new().unwrap();
    let backend = InMemory::load_from_file(dir.path().join("missing.json"))
        .await
        .unwrap();
    assert!(backend.is_empty().await);
}

#[tokio::test]
async fn test_load_rejects_unknown_version() {
    let dir = TempDir::new().unwrap();
    let file_path = dir.path().join("livetree.json");
    std::fs::write(&file_path, r#"{"_v": 9, "entries": {}}"#).unwrap();

    let err = InMemory::load_from_file(&file_path).await.unwrap_err();
    assert!(err.is_io_error());
}

#[tokio::test]
async fn test_load_rejects_invalid_contents() {
    let dir = TempDir::new().unwrap();
    let file_path = dir.path().join("livetree.json");

    std::fs::write(&file_path, "not json").unwrap();
    assert!(InMemory::load_from_file(&file_path).await.unwrap_err().is_io_error());

    std::fs::write(&file_path, r#"{"entries": {"zz": "00"}}"#).unwrap();
    let err = InMemory::load_from_file(&file_path).await.unwrap_err();
    assert!(err.is_integrity_error());
}

#[tokio::test]
async fn test_saved_file_is_versioned_hex() {
    let dir = TempDir::new().unwrap();
    let file_path = dir.path().join("livetree.json");

    let store = Store::new(Box::new(InMemory::new()));
    store.put("a", "x").await.unwrap();
    let backend = store.backend().as_any().downcast_ref::<InMemory>().unwrap();
    backend.save_to_file(&file_path).await.unwrap();

    let saved: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&file_path).unwrap()).unwrap();
    // "a\0" -> "\"x\""
    assert_eq!(saved, json!({"entries": {"6100": "227822"}}));
}
