//! End-to-end tests: start, mutate, shut down, restart against the same storage.

#![allow(clippy::unwrap_used)]

use localtodo::config::StorageBackend;
use localtodo::persistence::DEFAULT_SNAPSHOT_KEY;
use localtodo::{
    AppConfig, FileStorage, MemoryStorage, Persistence, PersistenceLayout, StorageAdapter,
    TodoApp, TodoEnvironment, TodoId, codec,
};
use localtodo_core::environment::Storage;
use localtodo_testing::{FailingStorage, test_clock};
use std::sync::Arc;
use std::time::Duration;

fn file_config(path: &std::path::Path, layout: PersistenceLayout) -> AppConfig {
    AppConfig {
        storage: StorageBackend::File(path.to_path_buf()),
        layout,
        write_delay: Duration::from_millis(5),
        ..AppConfig::default()
    }
}

fn app_over(storage: Arc<dyn Storage>, write_delay: Duration) -> TodoApp {
    let persistence = Persistence::new(
        StorageAdapter::new(storage, localtodo::persistence::DEFAULT_KEY_PREFIX),
        PersistenceLayout::PerRecord,
        write_delay,
    );
    TodoApp::new(
        TodoEnvironment::new(Arc::new(test_clock()), persistence),
        Duration::from_secs(2),
    )
}

#[tokio::test]
async fn todos_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profile.json");
    let config = file_config(&path, PersistenceLayout::PerRecord);

    {
        let mut app = TodoApp::from_config(&config);
        let report = app.start().await.unwrap();
        assert!(report.persistence_available);
        assert_eq!(report.loaded, 0);

        app.add("Buy milk").await.unwrap();
        app.add("Walk dog").await.unwrap();
        app.add("Call mum").await.unwrap();
        app.set_completion(TodoId::new(2), true).await.unwrap();
        app.delete(TodoId::new(3)).await.unwrap();
        app.shutdown().await.unwrap();
    }

    let mut app = TodoApp::from_config(&config);
    let report = app.start().await.unwrap();
    assert_eq!(report.loaded, 2);
    assert!(report.corrupted_keys.is_empty());

    let todos = app.todos().await;
    let ids: Vec<i64> = todos.iter().map(|t| t.id.get()).collect();
    assert_eq!(ids, vec![1, 2]);
    assert!(todos[1].is_completed);
    assert!(todos[1].completed_at.is_some());

    app.add("Water plants").await.unwrap();
    assert!(app.todo(TodoId::new(3)).await.is_some());
}

#[tokio::test]
async fn deferred_write_decodes_equal_to_memory() {
    let storage = Arc::new(MemoryStorage::new());
    let mut app = app_over(storage.clone(), Duration::from_millis(20));
    app.start().await.unwrap();

    app.add("Buy milk").await.unwrap();
    assert_eq!(storage.get("todo-2025-b--todo_1").unwrap(), None);

    app.settle(Duration::from_secs(2)).await.unwrap();
    let stored = storage.get("todo-2025-b--todo_1").unwrap().unwrap();
    let in_memory = app.todo(TodoId::FIRST).await.unwrap();
    assert_eq!(codec::decode(&stored).unwrap(), in_memory);
}

#[tokio::test]
async fn removals_are_immediate() {
    let storage = Arc::new(MemoryStorage::new());
    let mut app = app_over(storage.clone(), Duration::ZERO);
    app.start().await.unwrap();
    app.add("a").await.unwrap();
    app.settle(Duration::from_secs(1)).await.unwrap();

    app.delete(TodoId::FIRST).await.unwrap();
    app.settle(Duration::from_secs(1)).await.unwrap();
    assert!(storage.keys().unwrap().is_empty());
}

#[tokio::test]
async fn unrelated_keys_are_left_alone() {
    let storage = Arc::new(MemoryStorage::with_entries([
        ("theme", "dark"),
        ("todo-2025-a--todo_1", "{\"legacy\":true}"),
    ]));
    let mut app = app_over(storage.clone(), Duration::ZERO);

    let report = app.start().await.unwrap();
    assert_eq!(report.loaded, 0);
    assert!(report.corrupted_keys.is_empty());

    app.add("x").await.unwrap();
    app.clear_completed().await.unwrap();
    app.shutdown().await.unwrap();
    assert_eq!(storage.get("theme").unwrap().as_deref(), Some("dark"));
    assert_eq!(storage.keys().unwrap().len(), 3);
}

#[tokio::test]
async fn snapshot_layout_seeds_then_persists_whole_list() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profile.json");
    let config = file_config(
        &path,
        PersistenceLayout::Snapshot {
            key: DEFAULT_SNAPSHOT_KEY.to_string(),
        },
    );

    {
        let mut app = TodoApp::from_config(&config);
        let report = app.start().await.unwrap();
        assert!(report.seeded);
        let texts: Vec<String> = app.todos().await.into_iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["Buy avocado", "Do 50 push-ups"]);

        app.delete(TodoId::FIRST).await.unwrap();
        app.add("Stretch").await.unwrap();
        app.shutdown().await.unwrap();
    }

    let storage = FileStorage::open(&path).unwrap();
    let blob = storage.get(DEFAULT_SNAPSHOT_KEY).unwrap().unwrap();
    let decoded = codec::decode_collection(&blob).unwrap();
    let ids: Vec<i64> = decoded.records.iter().map(|t| t.id.get()).collect();
    assert_eq!(ids, vec![2, 3]);

    let mut app = TodoApp::from_config(&config);
    let report = app.start().await.unwrap();
    assert!(!report.seeded);
    assert_eq!(report.loaded, 2);
}

#[tokio::test]
async fn unusable_storage_runs_in_memory() {
    let mut app = app_over(Arc::new(FailingStorage::full()), Duration::ZERO);
    let report = app.start().await.unwrap();

    assert!(!report.persistence_available);
    assert!(app.take_notice().is_some());
    assert!(app.take_notice().is_none());

    app.add("only in memory").await.unwrap();
    app.complete_all().await.unwrap();
    assert_eq!(app.counts().await.completed, 1);
    app.shutdown().await.unwrap();
}

#[tokio::test]
async fn unreadable_storage_file_degrades() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profile.json");
    std::fs::write(&path, "this is not json").unwrap();

    let mut app = TodoApp::from_config(&file_config(&path, PersistenceLayout::PerRecord));
    let report = app.start().await.unwrap();
    assert!(!report.persistence_available);
    assert!(app.take_notice().is_some());

    assert_eq!(
        std::fs::read_to_string(&path).unwrap(),
        "this is not json"
    );
}

#[tokio::test]
async fn corrupted_records_are_skipped_and_counted() {
    let good = codec::encode(&localtodo::Todo::new(
        TodoId::new(8),
        "fine",
        chrono::DateTime::parse_from_rfc3339("2026-01-01T10:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc),
    ))
    .unwrap();
    let storage = Arc::new(MemoryStorage::with_entries([
        ("todo-2025-b--todo_8", good.as_str()),
        ("todo-2025-b--todo_9", "{\"id\":\"9\",\"text\":\"x\"}"),
        ("todo-2025-b--todo_10", "not json"),
    ]));
    let mut app = app_over(storage, Duration::ZERO);

    let report = app.start().await.unwrap();
    assert_eq!(report.loaded, 1);
    assert_eq!(report.corrupted_keys.len(), 2);

    app.add("next").await.unwrap();
    assert!(app.todo(TodoId::new(9)).await.is_some());
}

#[tokio::test]
async fn deleting_a_skipped_record_clears_it_from_storage() {
    let storage = Arc::new(MemoryStorage::with_entries([(
        "todo-2025-b--todo_9",
        "{\"id\":\"9\",\"text\":\"x\"}",
    )]));
    let mut app = app_over(storage.clone(), Duration::ZERO);
    let report = app.start().await.unwrap();
    assert_eq!(report.loaded, 0);

    app.delete(TodoId::new(9)).await.unwrap();
    app.settle(Duration::from_secs(1)).await.unwrap();
    assert!(storage.keys().unwrap().is_empty());
    assert!(app.todos().await.is_empty());
}

#[tokio::test]
async fn exhausted_ids_never_overwrite_stored_records() {
    let last = localtodo::Todo::new(
        TodoId::new(i64::MAX),
        "last",
        chrono::DateTime::parse_from_rfc3339("2026-01-01T10:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc),
    );
    let blob = codec::encode(&last).unwrap();
    let key = format!("todo-2025-b--todo_{}", i64::MAX);
    let storage = Arc::new(MemoryStorage::with_entries([(key.as_str(), blob.as_str())]));
    let mut app = app_over(storage.clone(), Duration::ZERO);
    app.start().await.unwrap();

    app.add("one more").await.unwrap();
    app.add("and another").await.unwrap();
    app.settle(Duration::from_secs(1)).await.unwrap();

    let ids: Vec<i64> = app.todos().await.iter().map(|t| t.id.get()).collect();
    assert_eq!(ids, vec![i64::MAX]);
    assert_eq!(storage.keys().unwrap(), vec![key.clone()]);
    assert_eq!(codec::decode(&storage.get(&key).unwrap().unwrap()).unwrap(), last);
}
