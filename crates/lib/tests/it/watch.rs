//! Live subscriptions.

use std::any::Any;

use async_trait::async_trait;
use livetree::{
    Document, Key, KeyRange, Path, Result, Store, WatchEvent, WatchState,
    backend::{Backend, ChangeFeed, Mutation, Rows, database::InMemory},
};
use serde_json::json;
use tokio::sync::mpsc;

use crate::helpers::{assert_no_event, doc, initial_value, next_event, test_store};

fn added(key: &str, value: serde_json::Value) -> WatchEvent {
    WatchEvent::ChildAdded {
        key: key.to_string(),
        value: doc(value),
    }
}

fn changed(key: &str, value: serde_json::Value) -> WatchEvent {
    WatchEvent::ChildChanged {
        key: key.to_string(),
        value: doc(value),
    }
}

fn removed(key: &str, value: serde_json::Value) -> WatchEvent {
    WatchEvent::ChildRemoved {
        key: key.to_string(),
        value: doc(value),
    }
}

fn value(value: serde_json::Value) -> WatchEvent {
    WatchEvent::Value(Some(doc(value)))
}

#[tokio::test]
async fn test_initial_value() {
    let store = test_store();
    store.put("users/eugene", json!({"name": "Eugene"})).await.unwrap();

    let mut watch = store.watch("users/eugene").await.unwrap();
    assert_eq!(initial_value(&mut watch).await, Some(json!({"name": "Eugene"})));
    assert_eq!(watch.state(), WatchState::Live);
    assert_eq!(watch.path(), &Path::parse("users/eugene"));
    assert_no_event(&mut watch).await;
}

#[tokio::test]
async fn test_initial_value_of_absent_path() {
    let store = test_store();
    let mut watch = store.watch("nothing").await.unwrap();
    assert_eq!(initial_value(&mut watch).await, None);
}

#[tokio::test]
async fn test_adding_a_field() {
    let store = test_store();
    store.put("users/eugene", json!({"name": "Eugene"})).await.unwrap();
    let mut watch = store.watch("users/eugene").await.unwrap();
    initial_value(&mut watch).await;

    store.put("users/eugene/age", 41i64).await.unwrap();
    assert_eq!(next_event(&mut watch).await, added("age", json!(41)));
    assert_eq!(
        next_event(&mut watch).await,
        value(json!({"name": "Eugene", "age": 41}))
    );
    assert_no_event(&mut watch).await;
}

#[tokio::test]
async fn test_changing_and_removing_fields() {
    let store = test_store();
    store
        .put("users/eugene", json!({"name": "Eugene", "age": 41}))
        .await
        .unwrap();
    let mut watch = store.watch("users/eugene").await.unwrap();
    initial_value(&mut watch).await;

    store.put("users/eugene/name", "Gene").await.unwrap();
    assert_eq!(next_event(&mut watch).await, changed("name", json!("Gene")));
    assert_eq!(
        next_event(&mut watch).await,
        value(json!({"name": "Gene", "age": 41}))
    );

    store.delete("users/eugene/age").await.unwrap();
    assert_eq!(next_event(&mut watch).await, removed("age", json!(41)));
    assert_eq!(next_event(&mut watch).await, value(json!({"name": "Gene"})));
}

#[tokio::test]
async fn test_nested_change_reports_direct_child() {
    let store = test_store();
    store
        .put("users/eugene", json!({"key": {"public": "k1"}}))
        .await
        .unwrap();
    let mut watch = store.watch("users/eugene").await.unwrap();
    initial_value(&mut watch).await;

    store.put("users/eugene/key/private", "k2").await.unwrap();
    assert_eq!(
        next_event(&mut watch).await,
        changed("key", json!({"public": "k1", "private": "k2"}))
    );
    assert_eq!(
        next_event(&mut watch).await,
        value(json!({"key": {"public": "k1", "private": "k2"}}))
    );
}

#[tokio::test]
async fn test_overwrite_reports_every_child_once() {
    let store = test_store();
    store
        .put("doc", json!({"keep": 1, "change": 1, "drop": 1}))
        .await
        .unwrap();
    let mut watch = store.watch("doc").await.unwrap();
    initial_value(&mut watch).await;

    // One atomic batch produces one round of events.
    store
        .put("doc", json!({"keep": 1, "change": 2, "add": 1}))
        .await
        .unwrap();
    assert_eq!(next_event(&mut watch).await, removed("drop", json!(1)));
    assert_eq!(next_event(&mut watch).await, added("add", json!(1)));
    assert_eq!(next_event(&mut watch).await, changed("change", json!(2)));
    assert_eq!(
        next_event(&mut watch).await,
        value(json!({"keep": 1, "change": 2, "add": 1}))
    );
    assert_no_event(&mut watch).await;
}

#[tokio::test]
async fn test_deleting_watched_path() {
    let store = test_store();
    store.put("a", json!({"x": 1})).await.unwrap();
    let mut watch = store.watch("a").await.unwrap();
    initial_value(&mut watch).await;

    store.delete("a").await.unwrap();
    assert_eq!(next_event(&mut watch).await, removed("x", json!(1)));
    assert_eq!(next_event(&mut watch).await, WatchEvent::Value(None));
}

#[tokio::test]
async fn test_scalar_watch() {
    let store = test_store();
    let mut watch = store.watch("counter").await.unwrap();
    assert_eq!(initial_value(&mut watch).await, None);

    store.put("counter", 1i64).await.unwrap();
    assert_eq!(next_event(&mut watch).await, value(json!(1)));
    store.put("counter", 2i64).await.unwrap();
    assert_eq!(next_event(&mut watch).await, value(json!(2)));
    store.delete("counter").await.unwrap();
    assert_eq!(next_event(&mut watch).await, WatchEvent::Value(None));
}

#[tokio::test]
async fn test_scalar_replaced_by_composite() {
    let store = test_store();
    store.put("a", "scalar").await.unwrap();
    let mut watch = store.watch("a").await.unwrap();
    assert_eq!(initial_value(&mut watch).await, Some(json!("scalar")));

    store.put("a", json!({"b": 1})).await.unwrap();
    assert_eq!(next_event(&mut watch).await, added("b", json!(1)));
    assert_eq!(next_event(&mut watch).await, value(json!({"b": 1})));
}

#[tokio::test]
async fn test_no_events_outside_subtree() {
    let store = test_store();
    store.put("a", json!({"x": 1})).await.unwrap();
    let mut watch = store.watch("a").await.unwrap();
    initial_value(&mut watch).await;

    // Outside the watched sub-tree, including a sibling sharing a prefix.
    store.put("b", 1i64).await.unwrap();
    store.put("ab/x", 1i64).await.unwrap();
    // Nothing to delete, so nothing is committed.
    store.delete("a/missing").await.unwrap();
    assert_no_event(&mut watch).await;
}

#[tokio::test]
async fn test_unchanged_rewrite_emits_value_only() {
    let store = test_store();
    store.put("a", json!({"x": 1})).await.unwrap();
    let mut watch = store.watch("a").await.unwrap();
    initial_value(&mut watch).await;

    store.put("a", json!({"x": 1})).await.unwrap();
    assert_eq!(next_event(&mut watch).await, value(json!({"x": 1})));
    assert_no_event(&mut watch).await;

    store.put("a/x", 1i64).await.unwrap();
    assert_eq!(next_event(&mut watch).await, value(json!({"x": 1})));
    assert_no_event(&mut watch).await;
}

#[tokio::test]
async fn test_changes_before_subscribe_are_not_replayed() {
    let store = test_store();
    // Start the dispatcher so the raw writes below queue up on its feed.
    let _other = store.watch("other").await.unwrap();

    let backend = store.backend();
    let x = Key::encode(&Path::parse("p/x")).into_bytes();
    backend.put(x.clone(), b"1".to_vec()).await.unwrap();
    backend.delete(x).await.unwrap();

    let mut watch = store.watch("p").await.unwrap();
    assert_eq!(initial_value(&mut watch).await, None);
    assert_no_event(&mut watch).await;

    store.put("p/y", 2i64).await.unwrap();
    assert_eq!(next_event(&mut watch).await, added("y", json!(2)));
    assert_eq!(next_event(&mut watch).await, value(json!({"y": 2})));
}

#[tokio::test]
async fn test_writes_racing_subscribe_are_seen_once() {
    let store = test_store();
    let writer = {
        let store = store.clone();
        tokio::spawn(async move {
            for i in 0..50i64 {
                store.put("n", i).await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    let mut watch = store.watch("n").await.unwrap();
    let mut last = match next_event(&mut watch).await {
        WatchEvent::Value(document) => document.map(|d| d.to_json()),
        other => panic!("Expected initial value event, got {other:?}"),
    };
    writer.await.unwrap();

    // Every later value is strictly newer than the one before it.
    while last != Some(json!(49)) {
        let WatchEvent::Value(Some(document)) = next_event(&mut watch).await else {
            panic!("Expected a value event");
        };
        let n = document.to_json().as_i64().unwrap();
        if let Some(previous) = last.as_ref().and_then(serde_json::Value::as_i64) {
            assert!(n > previous, "value went from {previous} back to {n}");
        }
        last = Some(json!(n));
    }
    assert_no_event(&mut watch).await;
}

#[tokio::test]
async fn test_ancestor_write_reaches_watch() {
    let store = test_store();
    let mut watch = store.watch("users/eugene").await.unwrap();
    initial_value(&mut watch).await;

    store
        .put("users", json!({"eugene": {"name": "Eugene"}, "bob": {"name": "Bob"}}))
        .await
        .unwrap();
    assert_eq!(next_event(&mut watch).await, added("name", json!("Eugene")));
    assert_eq!(next_event(&mut watch).await, value(json!({"name": "Eugene"})));
    assert_no_event(&mut watch).await;
}

#[tokio::test]
async fn test_push_reports_child_added() {
    let store = test_store();
    let mut watch = store.watch("messages").await.unwrap();
    initial_value(&mut watch).await;

    let id = store.push("messages", json!({"text": "hi"})).await.unwrap();
    assert_eq!(next_event(&mut watch).await, added(&id, json!({"text": "hi"})));
    assert_eq!(next_event(&mut watch).await.name(), "value");
}

#[tokio::test]
async fn test_root_watch_sees_everything() {
    let store = test_store();
    let mut watch = store.watch("/").await.unwrap();
    assert_eq!(initial_value(&mut watch).await, None);

    store.put("a/b", 1i64).await.unwrap();
    assert_eq!(next_event(&mut watch).await, added("a", json!({"b": 1})));
    assert_eq!(next_event(&mut watch).await, value(json!({"a": {"b": 1}})));
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let store = test_store();
    let mut watch = store.watch("a").await.unwrap();
    initial_value(&mut watch).await;
    assert_eq!(store.watch_count(), 1);

    watch.close();
    watch.close();
    assert_eq!(watch.state(), WatchState::Closed);
    assert_eq!(store.watch_count(), 0);

    store.put("a", 1i64).await.unwrap();
    assert!(watch.recv().await.is_none());
}

#[tokio::test]
async fn test_close_from_handle() {
    let store = test_store();
    let mut watch = store.watch("a").await.unwrap();
    initial_value(&mut watch).await;

    let handle = watch.handle();
    let closer = tokio::spawn(async move {
        handle.close();
        handle.close();
        handle.state()
    });
    assert_eq!(closer.await.unwrap(), WatchState::Closed);

    store.put("a", 1i64).await.unwrap();
    assert!(watch.recv().await.is_none());
    watch.close();
}

#[tokio::test]
async fn test_dropping_watch_unregisters() {
    let store = test_store();
    let watch = store.watch("a").await.unwrap();
    let other = store.watch("b").await.unwrap();
    assert_eq!(store.watch_count(), 2);
    drop(watch);
    assert_eq!(store.watch_count(), 1);
    drop(other);
    assert_eq!(store.watch_count(), 0);
}

#[tokio::test]
async fn test_independent_watches() {
    let store = test_store();
    let mut a = store.watch("a").await.unwrap();
    let mut b = store.watch("b").await.unwrap();
    initial_value(&mut a).await;
    initial_value(&mut b).await;

    store.put("a/x", 1i64).await.unwrap();
    assert_eq!(next_event(&mut a).await, added("x", json!(1)));
    assert_no_event(&mut b).await;
}

#[tokio::test]
async fn test_events_follow_commit_order() {
    let store = test_store();
    let mut watch = store.watch("n").await.unwrap();
    initial_value(&mut watch).await;

    for i in 0..20i64 {
        store.put("n", i).await.unwrap();
    }
    for i in 0..20i64 {
        assert_eq!(next_event(&mut watch).await, value(json!(i)));
    }
}

#[tokio::test]
async fn test_seed_failure_emits_error() {
    let store = test_store();
    store
        .backend()
        .put(Key::encode(&Path::parse("bad")).into_bytes(), b"{".to_vec())
        .await
        .unwrap();

    let mut watch = store.watch("bad").await.unwrap();
    let event = next_event(&mut watch).await;
    assert_eq!(event.name(), "error");
    assert!(watch.recv().await.is_none());
    assert_eq!(watch.state(), WatchState::Closed);
}

/// An engine whose change feed is closed from the start.
struct ClosedFeed(InMemory);

#[async_trait]
impl Backend for ClosedFeed {
    async fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.0.get(key).await
    }

    async fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.0.put(key, value).await
    }

    async fn delete(&self, key: Vec<u8>) -> Result<()> {
        self.0.delete(key).await
    }

    async fn batch(&self, mutations: Vec<Mutation>) -> Result<()> {
        self.0.batch(mutations).await
    }

    async fn scan(&self, range: &KeyRange) -> Result<Rows> {
        self.0.scan(range).await
    }

    async fn snapshot(&self, range: &KeyRange) -> Result<(u64, Rows)> {
        self.0.snapshot(range).await
    }

    fn subscribe(&self) -> ChangeFeed {
        let (_tx, rx) = mpsc::unbounded_channel();
        rx
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[tokio::test]
async fn test_feed_failure_emits_error_and_closes() {
    let store = Store::new(Box::new(ClosedFeed(InMemory::new())));
    store.put("a", 1i64).await.unwrap();

    let mut watch = store.watch("a").await.unwrap();
    let mut events = Vec::new();
    while let Ok(Some(event)) =
        tokio::time::timeout(crate::helpers::EVENT_TIMEOUT, watch.recv()).await
    {
        events.push(event);
    }
    assert_eq!(events.last().map(WatchEvent::name), Some("error"));
    assert_eq!(watch.state(), WatchState::Closed);

    // Once the dispatcher has seen the feed close, new watches are refused.
    let err = store.watch("a").await.unwrap_err();
    assert!(err.is_feed_error());
}

#[tokio::test]
async fn test_watch_event_accessors() {
    let event = added("k", json!(1));
    assert_eq!(event.name(), "child_added");
    assert_eq!(event.key(), Some("k"));
    let event = WatchEvent::Value(Some(Document::from(1i64)));
    assert_eq!(event.key(), None);
}
