// crates/live-node-broker/tests/common/mod.rs
// =============================================================================
// Module: Broker Test Helpers
// Description: In-process node fixtures for dispatcher tests.
// Purpose: Wire a memory broker, directory object store, and host together.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::time::Duration;

use live_node_broker::BrokerTransport;
use live_node_broker::Dispatcher;
use live_node_broker::MemoryAuditSink;
use live_node_broker::MemoryBroker;
use live_node_broker::OutboundMessage;
use live_node_core::DatabaseKey;
use live_node_core::NodeIdentity;
use live_node_core::ObjectStore;
use live_node_object_store::FileObjectStore;
use live_node_store_sqlite::DatabaseHost;
use live_node_store_sqlite::LocalStore;
use live_node_store_sqlite::QueryLimits;
use rusqlite::Connection;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;

/// Node identity used by every fixture.
pub const NODE: &str = "node-1";
/// Creation queue used by every fixture.
pub const CREATE_QUEUE: &str = "create_queue";
/// Upper bound on waiting for one reply.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Node parts sharing one scratch directory.
pub struct Fixture {
    /// Scratch directory holding objects and live files.
    pub dir: TempDir,
    /// In-memory broker.
    pub broker: Arc<MemoryBroker>,
    /// Captured audit events.
    pub audit: Arc<MemoryAuditSink>,
    /// Dispatcher under test.
    pub dispatcher: Arc<Dispatcher>,
}

impl Fixture {
    /// Builds a fixture whose object store holds `alice/db1` with table `t1`.
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let objects_root = dir.path().join("objects");
        let object_dir = objects_root.join("alice");
        std::fs::create_dir_all(&object_dir).unwrap();
        let connection = Connection::open(object_dir.join("db1")).unwrap();
        connection
            .execute_batch(
                "CREATE TABLE t1 (id INTEGER PRIMARY KEY, label TEXT);
                 INSERT INTO t1 (label) VALUES ('first'), ('second');",
            )
            .unwrap();
        drop(connection);

        let objects = FileObjectStore::new(objects_root, None, 64 * 1024 * 1024).unwrap();
        let store = LocalStore::open(dir.path().join("live")).unwrap();
        let host = Arc::new(DatabaseHost::new(
            store,
            Arc::new(objects) as Arc<dyn ObjectStore>,
            QueryLimits::default(),
        ));
        let broker = Arc::new(MemoryBroker::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let dispatcher = Arc::new(Dispatcher::new(
            NodeIdentity::new(NODE).unwrap(),
            host,
            Arc::clone(&broker) as Arc<dyn BrokerTransport>,
            Arc::clone(&audit) as Arc<dyn live_node_broker::AuditSink>,
        ));
        Self {
            dir,
            broker,
            audit,
            dispatcher,
        }
    }

    /// Returns the live file path for a key.
    pub fn live_path(&self, key: &DatabaseKey) -> std::path::PathBuf {
        LocalStore::new(self.dir.path().join("live")).path_for(key)
    }

    /// Waits for the next reply, failing the test after [`REPLY_TIMEOUT`].
    pub async fn reply(&self) -> OutboundMessage {
        tokio::time::timeout(REPLY_TIMEOUT, self.broker.next_reply())
            .await
            .expect("reply within timeout")
            .expect("reply channel open")
    }
}

/// Encodes a request body.
pub fn request(operation: &str, owner: &str, name: &str, query: &str) -> Vec<u8> {
    json!({
        "operation": operation,
        "db_owner": owner,
        "db_name": name,
        "query": query,
        "requesting_user": "bob",
    })
    .to_string()
    .into_bytes()
}

/// Decodes a reply body.
pub fn body(message: &OutboundMessage) -> Value {
    serde_json::from_slice(&message.body).unwrap()
}
