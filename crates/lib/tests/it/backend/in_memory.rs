use livetree::{
    Key, Path,
    backend::{Backend, Change, ChangeEvent, Mutation, database::InMemory},
};

fn key(path: &str) -> Vec<u8> {
    Key::encode(&Path::parse(path)).into_bytes()
}

#[tokio::test]
async fn test_get_put_delete() {
    let backend = InMemory::new();

    let err = backend.get(&key("a")).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.module(), "backend");

    backend.put(key("a"), b"1".to_vec()).await.unwrap();
    assert_eq!(backend.get(&key("a")).await.unwrap(), b"1");

    backend.delete(key("a")).await.unwrap();
    assert!(backend.get(&key("a")).await.unwrap_err().is_not_found());

    // Deleting an absent key succeeds.
    backend.delete(key("a")).await.unwrap();
    assert!(backend.is_empty().await);
}

#[tokio::test]
async fn test_batch_applies_in_order() {
    let backend = InMemory::new();
    backend.put(key("a"), b"old".to_vec()).await.unwrap();

    backend
        .batch(vec![
            Mutation::del(key("a")),
            Mutation::put(key("a"), b"new".to_vec()),
            Mutation::put(key("b"), b"2".to_vec()),
            Mutation::put(key("c"), b"3".to_vec()),
            Mutation::del(key("c")),
        ])
        .await
        .unwrap();

    assert_eq!(backend.get(&key("a")).await.unwrap(), b"new");
    assert_eq!(backend.get(&key("b")).await.unwrap(), b"2");
    assert!(backend.get(&key("c")).await.unwrap_err().is_not_found());
    assert_eq!(backend.len().await, 2);
}

#[tokio::test]
async fn test_scan_covers_exactly_the_subtree() {
    let backend = InMemory::new();
    for path in ["a", "a/b", "a/b/c", "a/d", "ab", "b"] {
        backend.put(key(path), path.as_bytes().to_vec()).await.unwrap();
    }

    let rows = backend.scan(&Key::descendants(&Path::parse("a"))).await.unwrap();
    let values: Vec<&[u8]> = rows.iter().map(|(_, v)| v.as_slice()).collect();
    assert_eq!(values, [b"a/b".as_slice(), b"a/b/c", b"a/d"]);

    let rows = backend.scan(&Key::subtree(&Path::parse("a"))).await.unwrap();
    assert_eq!(rows.len(), 4);

    let rows = backend.scan(&Key::descendants(&Path::root())).await.unwrap();
    assert_eq!(rows.len(), 6);

    // Rows come back in key order, and a fresh call starts over.
    let again = backend.scan(&Key::descendants(&Path::root())).await.unwrap();
    assert_eq!(rows, again);
    let keys: Vec<&Vec<u8>> = rows.iter().map(|(k, _)| k).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[tokio::test]
async fn test_change_feed_preserves_commit_order() {
    let backend = InMemory::new();
    let mut feed = backend.subscribe();
    assert_eq!(backend.subscriber_count(), 1);

    backend.put(key("a"), b"1".to_vec()).await.unwrap();
    backend
        .batch(vec![Mutation::put(key("b"), b"2".to_vec()), Mutation::del(key("a"))])
        .await
        .unwrap();
    backend.delete(key("b")).await.unwrap();

    assert_eq!(
        feed.recv().await.unwrap(),
        Change {
            sequence: 1,
            event: ChangeEvent::Put {
                key: key("a"),
                value: b"1".to_vec()
            }
        }
    );
    assert_eq!(
        feed.recv().await.unwrap().event,
        ChangeEvent::Batch(vec![Mutation::put(key("b"), b"2".to_vec()), Mutation::del(key("a"))])
    );
    let last = feed.recv().await.unwrap();
    assert_eq!(last.sequence, 3);
    assert_eq!(last.event, ChangeEvent::Del { key: key("b") });

    drop(feed);
    assert_eq!(backend.subscriber_count(), 0);
}

#[tokio::test]
async fn test_snapshot_reports_last_sequence() {
    let backend = InMemory::new();
    let range = Key::subtree(&Path::parse("a"));
    assert_eq!(backend.snapshot(&range).await.unwrap(), (0, Vec::new()));

    backend.put(key("a/x"), b"1".to_vec()).await.unwrap();
    backend.put(key("b"), b"2".to_vec()).await.unwrap();
    let (sequence, rows) = backend.snapshot(&range).await.unwrap();
    assert_eq!(sequence, 2);
    assert_eq!(rows, vec![(key("a/x"), b"1".to_vec())]);
    assert_eq!(rows, backend.scan(&range).await.unwrap());

    // Every change after the snapshot carries a greater number.
    let mut feed = backend.subscribe();
    backend.delete(key("a/x")).await.unwrap();
    assert!(feed.recv().await.unwrap().sequence > sequence);
}

#[tokio::test]
async fn test_feed_ends_when_engine_dropped() {
    let backend = InMemory::new();
    let mut feed = backend.subscribe();
    drop(backend);
    assert!(feed.recv().await.is_none());
}

#[tokio::test]
async fn test_concurrent_batches_are_atomic() {
    let backend = std::sync::Arc::new(InMemory::new());
    let mut writers = tokio::task::JoinSet::new();
    for i in 0..8u8 {
        let backend = backend.clone();
        writers.spawn(async move {
            backend
                .batch(vec![
                    Mutation::put(key("x"), vec![i]),
                    Mutation::put(key("y"), vec![i]),
                ])
                .await
                .unwrap();
        });
    }
    while let Some(joined) = writers.join_next().await {
        joined.unwrap();
    }
    // Both keys always come from the same batch.
    assert_eq!(
        backend.get(&key("x")).await.unwrap(),
        backend.get(&key("y")).await.unwrap()
    );
}
