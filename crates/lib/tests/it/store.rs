//! Store-level behavior: push ids, deletes, clones, concurrent writers.

use livetree::{Document, push_id::PUSH_ID_LEN};
use serde_json::json;

use crate::helpers::{get_json, test_store, test_store_with_clock};

#[tokio::test]
async fn test_push_returns_sortable_ids() {
    let (store, clock) = test_store_with_clock();

    let mut ids = Vec::new();
    for i in 0..5i64 {
        ids.push(store.push("messages", json!({"n": i})).await.unwrap());
        if i == 2 {
            clock.advance(1);
        }
    }

    assert!(ids.iter().all(|id| id.len() == PUSH_ID_LEN));
    let mut sorted = ids.clone();
    sorted.sort();
    assert_eq!(ids, sorted);

    // Children come back in creation order.
    let messages = store.get("messages").await.unwrap().unwrap();
    let keys: Vec<&String> = messages.children().unwrap().keys().collect();
    assert_eq!(keys, ids.iter().collect::<Vec<_>>());
    assert_eq!(
        get_json(&store, &format!("messages/{}", ids[3])).await,
        Some(json!({"n": 3}))
    );
}

#[tokio::test]
async fn test_push_under_missing_parent() {
    let store = test_store();
    let id = store.push("a/b", "x").await.unwrap();
    assert_eq!(get_json(&store, &format!("a/b/{id}")).await, Some(json!("x")));
    let a = store.get("a").await.unwrap().unwrap();
    assert_eq!(a.get(&["b", id.as_str()]), Some(&Document::from("x")));
}

#[tokio::test]
async fn test_delete_removes_subtree() {
    let store = test_store();
    store
        .put("users", json!({"eugene": {"name": "Eugene"}, "bob": {"name": "Bob"}}))
        .await
        .unwrap();

    store.delete("users/eugene").await.unwrap();
    assert_eq!(get_json(&store, "users").await, Some(json!({"bob": {"name": "Bob"}})));

    store.delete("users").await.unwrap();
    assert_eq!(get_json(&store, "users").await, None);
    assert_eq!(get_json(&store, "").await, None);
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let store = test_store();
    store.put("a", 1i64).await.unwrap();
    store.delete("a").await.unwrap();
    store.delete("a").await.unwrap();
    store.delete("never/existed").await.unwrap();
    assert_eq!(get_json(&store, "a").await, None);
}

#[tokio::test]
async fn test_delete_root_clears_store() {
    let store = test_store();
    store.put("a", 1i64).await.unwrap();
    store.put("b/c", 2i64).await.unwrap();
    store.delete("/").await.unwrap();
    assert_eq!(get_json(&store, "").await, None);
}

#[tokio::test]
async fn test_clones_share_state() {
    let store = test_store();
    let other = store.clone();
    store.put("a", "shared").await.unwrap();
    assert_eq!(
        other.get("a").await.unwrap(),
        Some(Document::from("shared"))
    );

    let mut watch = other.watch("a").await.unwrap();
    assert_eq!(store.watch_count(), 1);
    watch.close();
    assert_eq!(store.watch_count(), 0);
}

#[tokio::test]
async fn test_concurrent_writers() {
    let store = test_store();
    let mut writers = tokio::task::JoinSet::new();
    for i in 0..10i64 {
        let store = store.clone();
        writers.spawn(async move { store.put(&format!("items/{i}"), json!({"n": i})).await });
    }
    while let Some(joined) = writers.join_next().await {
        joined.unwrap().unwrap();
    }
    let items = store.get("items").await.unwrap().unwrap();
    assert_eq!(items.children().unwrap().len(), 10);
    assert_eq!(items.to_json()[7], json!({"n": 7}));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_overwrites_never_merge() {
    let store = test_store();
    for _ in 0..100 {
        let (a, b) = tokio::join!(
            tokio::spawn({
                let store = store.clone();
                async move { store.put("doc", json!({"a": 1})).await }
            }),
            tokio::spawn({
                let store = store.clone();
                async move { store.put("doc", json!({"b": 2})).await }
            }),
        );
        a.unwrap().unwrap();
        b.unwrap().unwrap();

        let result = get_json(&store, "doc").await.unwrap();
        assert!(
            result == json!({"a": 1}) || result == json!({"b": 2}),
            "overwrites merged into {result}"
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_put_and_delete_leave_no_residue() {
    let store = test_store();
    for _ in 0..100 {
        store.put("doc", json!({"old": 1})).await.unwrap();
        let (put, delete) = tokio::join!(
            tokio::spawn({
                let store = store.clone();
                async move { store.put("doc", json!({"new": 2})).await }
            }),
            tokio::spawn({
                let store = store.clone();
                async move { store.delete("doc").await }
            }),
        );
        put.unwrap().unwrap();
        delete.unwrap().unwrap();

        let result = get_json(&store, "doc").await;
        assert!(
            result.is_none() || result == Some(json!({"new": 2})),
            "unexpected document {result:?}"
        );
    }
}
