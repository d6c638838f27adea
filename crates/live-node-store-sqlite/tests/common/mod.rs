// crates/live-node-store-sqlite/tests/common/mod.rs
// =============================================================================
// Module: SQLite Store Test Helpers
// Description: Fixture databases and in-memory object stores.
// Purpose: Share setup across live-node-store-sqlite integration tests.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use live_node_core::DatabaseKey;
use live_node_core::ObjectStore;
use live_node_core::ObjectStoreError;
use live_node_store_sqlite::DatabaseHost;
use live_node_store_sqlite::LocalStore;
use live_node_store_sqlite::QueryLimits;
use rusqlite::Connection;
use tempfile::TempDir;

/// Schema and rows of the standard fixture database.
pub const FIXTURE_SQL: &str = "
CREATE TABLE t1 (id INTEGER PRIMARY KEY, name TEXT NOT NULL DEFAULT 'anon', score REAL, payload BLOB);
CREATE TABLE memberships (user_id INTEGER, group_id INTEGER, PRIMARY KEY (group_id, user_id));
CREATE INDEX t1_name_idx ON t1 (name);
CREATE VIEW high_scores AS SELECT name, score FROM t1 WHERE score > 50;
INSERT INTO t1 (id, name, score, payload) VALUES (1, 'ada', 91.5, x'0102');
INSERT INTO t1 (id, name, score, payload) VALUES (2, 'grace', 42.0, NULL);
INSERT INTO t1 (id, name, score, payload) VALUES (3, 'linus', NULL, NULL);
";

/// Builds a database key, panicking on invalid input.
pub fn key(owner: &str, name: &str) -> DatabaseKey {
    DatabaseKey::new(owner, name).expect("valid key")
}

/// Returns the bytes of a database built from `sql`.
pub fn database_bytes(sql: &str) -> Vec<u8> {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("fixture.sqlite");
    write_database(&path, sql);
    std::fs::read(&path).expect("read fixture")
}

/// Returns the bytes of the standard fixture database.
pub fn fixture_bytes() -> Vec<u8> {
    database_bytes(FIXTURE_SQL)
}

/// Creates a database file at `path` from `sql`.
pub fn write_database(path: &Path, sql: &str) {
    let connection = Connection::open(path).expect("open fixture");
    connection.execute_batch(sql).expect("fixture sql");
}

/// Object store backed by a map, counting fetches.
#[derive(Default)]
pub struct MemoryObjectStore {
    /// Stored objects keyed by `owner/name`.
    objects: Mutex<HashMap<String, Vec<u8>>>,
    /// Number of fetch calls.
    fetches: AtomicUsize,
}

impl MemoryObjectStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts an object for `key`.
    pub fn insert(&self, key: &DatabaseKey, bytes: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
    }

    /// Returns the stored object for `key`.
    pub fn get(&self, key: &DatabaseKey) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(&key.to_string()).cloned()
    }

    /// Returns the number of fetch calls so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn fetch_object(&self, key: &DatabaseKey) -> Result<Vec<u8>, ObjectStoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.get(key).ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
    }

    async fn store_object(
        &self,
        key: &DatabaseKey,
        bytes: Vec<u8>,
    ) -> Result<(), ObjectStoreError> {
        self.insert(key, bytes);
        Ok(())
    }
}

/// Object store whose uploads always fail.
pub struct RejectingUploads {
    /// Store used for fetches.
    inner: MemoryObjectStore,
}

impl RejectingUploads {
    /// Wraps a populated store.
    pub const fn new(inner: MemoryObjectStore) -> Self {
        Self {
            inner,
        }
    }
}

#[async_trait]
impl ObjectStore for RejectingUploads {
    async fn fetch_object(&self, key: &DatabaseKey) -> Result<Vec<u8>, ObjectStoreError> {
        self.inner.fetch_object(key).await
    }

    async fn store_object(
        &self,
        _key: &DatabaseKey,
        _bytes: Vec<u8>,
    ) -> Result<(), ObjectStoreError> {
        Err(ObjectStoreError::Backend("upload refused".to_string()))
    }
}

/// Host over a fresh storage root with the fixture available as `alice/db1`.
pub struct Harness {
    /// Storage root.
    pub dir: TempDir,
    /// Object store shared with the host.
    pub objects: Arc<MemoryObjectStore>,
    /// Host under test.
    pub host: DatabaseHost,
}

impl Harness {
    /// Builds a harness with default limits.
    pub fn new() -> Self {
        Self::with_limits(QueryLimits::default())
    }

    /// Builds a harness with explicit limits.
    pub fn with_limits(limits: QueryLimits) -> Self {
        let dir = TempDir::new().expect("tempdir");
        let objects = Arc::new(MemoryObjectStore::new());
        objects.insert(&fixture_key(), fixture_bytes());
        let store = LocalStore::open(dir.path().join("live")).expect("store");
        let host = DatabaseHost::new(store, Arc::clone(&objects) as Arc<dyn ObjectStore>, limits);
        Self {
            dir,
            objects,
            host,
        }
    }
}

/// Key of the fixture database.
pub fn fixture_key() -> DatabaseKey {
    key("alice", "db1")
}
