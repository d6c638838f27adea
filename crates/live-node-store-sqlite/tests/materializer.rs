// crates/live-node-store-sqlite/tests/materializer.rs
// ============================================================================
// Module: Materializer Tests
// Description: Fetch-and-install behavior of live database files.
// Purpose: Validate idempotence, atomic install, and failure reporting.
// ============================================================================

//! ## Overview
//! Runs [`Materializer`] against an in-memory object store.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::sync::Arc;

use live_node_core::ObjectStore;
use live_node_store_sqlite::LocalStore;
use live_node_store_sqlite::MaterializeOutcome;
use live_node_store_sqlite::Materializer;
use live_node_store_sqlite::SqliteStoreError;
use tempfile::TempDir;

use crate::common::MemoryObjectStore;
use crate::common::fixture_bytes;
use crate::common::key;

fn materializer(dir: &TempDir, objects: &Arc<MemoryObjectStore>) -> Materializer {
    let store = LocalStore::open(dir.path()).unwrap();
    Materializer::new(store, Arc::clone(objects) as Arc<dyn ObjectStore>)
}

#[tokio::test]
async fn materialize_installs_fetched_bytes() {
    let dir = TempDir::new().unwrap();
    let objects = Arc::new(MemoryObjectStore::new());
    let db = key("alice", "db1");
    objects.insert(&db, fixture_bytes());
    let materializer = materializer(&dir, &objects);

    let outcome = materializer.materialize(&db).await.unwrap();

    assert_eq!(outcome, MaterializeOutcome::Created);
    let installed = std::fs::read(LocalStore::new(dir.path()).path_for(&db)).unwrap();
    assert_eq!(installed, fixture_bytes());
}

#[tokio::test]
async fn second_materialize_does_not_fetch_again() {
    let dir = TempDir::new().unwrap();
    let objects = Arc::new(MemoryObjectStore::new());
    let db = key("alice", "db1");
    objects.insert(&db, fixture_bytes());
    let materializer = materializer(&dir, &objects);

    materializer.materialize(&db).await.unwrap();
    let outcome = materializer.materialize(&db).await.unwrap();

    assert_eq!(outcome, MaterializeOutcome::AlreadyPresent);
    assert_eq!(objects.fetch_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_materialize_produces_single_file() {
    let dir = TempDir::new().unwrap();
    let objects = Arc::new(MemoryObjectStore::new());
    let db = key("alice", "db1");
    objects.insert(&db, fixture_bytes());
    let materializer = materializer(&dir, &objects);

    let mut tasks = Vec::new();
    for _ in 0 .. 8 {
        let materializer = materializer.clone();
        let db = db.clone();
        tasks.push(tokio::spawn(async move { materializer.materialize(&db).await }));
    }
    let mut created = 0;
    for task in tasks {
        if task.await.unwrap().unwrap() == MaterializeOutcome::Created {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    let database_dir = LocalStore::new(dir.path()).database_dir(&db);
    let entries: Vec<_> = std::fs::read_dir(&database_dir).unwrap().collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(std::fs::read(database_dir.join("live.sqlite")).unwrap(), fixture_bytes());
}

#[tokio::test]
async fn missing_object_fails_without_local_file() {
    let dir = TempDir::new().unwrap();
    let objects = Arc::new(MemoryObjectStore::new());
    let db = key("alice", "absent");
    let materializer = materializer(&dir, &objects);

    let err = materializer.materialize(&db).await.unwrap_err();

    assert!(matches!(err, SqliteStoreError::Fetch(_)));
    assert!(!LocalStore::new(dir.path()).exists(&db));
}

#[tokio::test]
async fn non_database_bytes_are_rejected() {
    let dir = TempDir::new().unwrap();
    let objects = Arc::new(MemoryObjectStore::new());
    let db = key("alice", "notes");
    objects.insert(&db, b"plain text, not a database".to_vec());
    let materializer = materializer(&dir, &objects);

    let err = materializer.materialize(&db).await.unwrap_err();

    assert!(matches!(err, SqliteStoreError::InvalidImage(_)));
    assert!(!LocalStore::new(dir.path()).exists(&db));
}
