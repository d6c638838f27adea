// crates/live-node-store-sqlite/tests/handlers.rs
// ============================================================================
// Module: Database Host Tests
// Description: Operation behavior against a materialized fixture database.
// Purpose: Validate introspection, guarded SQL, and backup through the host.
// Threat Models: untrusted SQL text altering schema or escaping the file.
// ============================================================================

//! ## Overview
//! Each test materializes the fixture as `alice/db1` through
//! [`DatabaseHost::create`] and then drives one operation.

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

use live_node_core::CellValue;
use live_node_core::NodeError;
use live_node_core::ObjectStore;
use live_node_store_sqlite::DatabaseHost;
use live_node_store_sqlite::LocalStore;
use live_node_store_sqlite::MaterializeOutcome;
use live_node_store_sqlite::QueryLimits;
use rusqlite::Connection;
use tempfile::TempDir;

use crate::common::Harness;
use crate::common::MemoryObjectStore;
use crate::common::RejectingUploads;
use crate::common::database_bytes;
use crate::common::fixture_bytes;
use crate::common::fixture_key;
use crate::common::key;

async fn ready() -> Harness {
    let harness = Harness::new();
    let outcome = harness.host.create(&fixture_key()).await.unwrap();
    assert_eq!(outcome, MaterializeOutcome::Created);
    harness
}

// ============================================================================
// SECTION: Introspection
// ============================================================================

#[tokio::test]
async fn tables_excludes_internal_tables() {
    let harness = ready().await;
    let tables = harness.host.tables(&fixture_key()).await.unwrap();
    assert_eq!(tables, vec!["memberships".to_string(), "t1".to_string()]);
}

#[tokio::test]
async fn views_lists_views_only() {
    let harness = ready().await;
    let views = harness.host.views(&fixture_key()).await.unwrap();
    assert_eq!(views, vec!["high_scores".to_string()]);
}

#[tokio::test]
async fn indexes_lists_user_indexes_with_columns() {
    let harness = ready().await;
    let indexes = harness.host.indexes(&fixture_key()).await.unwrap();
    assert_eq!(indexes.len(), 1);
    assert_eq!(indexes[0].name, "t1_name_idx");
    assert_eq!(indexes[0].table, "t1");
    assert_eq!(indexes[0].columns.len(), 1);
    assert_eq!(indexes[0].columns[0].name, "name");
    assert_eq!(indexes[0].columns[0].id, 1);
}

#[tokio::test]
async fn indexes_on_database_without_indexes_is_empty() {
    let dir = TempDir::new().unwrap();
    let objects = Arc::new(MemoryObjectStore::new());
    let db = key("carol", "plain");
    objects.insert(&db, database_bytes("CREATE TABLE notes (body TEXT);"));
    let host = DatabaseHost::new(
        LocalStore::open(dir.path()).unwrap(),
        objects as Arc<dyn ObjectStore>,
        QueryLimits::default(),
    );
    host.create(&db).await.unwrap();
    assert!(host.indexes(&db).await.unwrap().is_empty());
}

#[tokio::test]
async fn columns_describe_table_and_primary_key() {
    let harness = ready().await;
    let (columns, pk_columns) = harness.host.columns(&fixture_key(), "t1").await.unwrap();
    let names: Vec<&str> = columns.iter().map(|column| column.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "score", "payload"]);
    assert_eq!(columns[0].data_type, "INTEGER");
    assert_eq!(columns[0].pk, 1);
    assert!(columns[1].not_null);
    assert_eq!(columns[1].default_value.as_deref(), Some("'anon'"));
    assert_eq!(pk_columns, vec!["id".to_string()]);
}

#[tokio::test]
async fn columns_order_composite_primary_key_by_position() {
    let harness = ready().await;
    let (_, pk_columns) = harness.host.columns(&fixture_key(), "memberships").await.unwrap();
    assert_eq!(pk_columns, vec!["group_id".to_string(), "user_id".to_string()]);
}

#[tokio::test]
async fn columns_on_missing_table_is_not_found() {
    let harness = ready().await;
    let err = harness.host.columns(&fixture_key(), "ghost").await.unwrap_err();
    assert!(matches!(err, NodeError::NotFound(_)));
}

#[tokio::test]
async fn operations_on_unmaterialized_database_are_not_found() {
    let harness = Harness::new();
    let err = harness.host.tables(&fixture_key()).await.unwrap_err();
    assert!(matches!(err, NodeError::NotFound(_)));
    assert_eq!(harness.objects.fetch_count(), 0);
}

// ============================================================================
// SECTION: Query
// ============================================================================

#[tokio::test]
async fn query_returns_typed_cells_in_column_order() {
    let harness = ready().await;
    let records = harness
        .host
        .query(&fixture_key(), "SELECT id, name, score, payload FROM t1 ORDER BY id")
        .await
        .unwrap();
    assert_eq!(records.columns, vec!["id", "name", "score", "payload"]);
    assert_eq!(records.rows.len(), 3);
    assert_eq!(
        records.rows[0],
        vec![
            CellValue::Integer(1),
            CellValue::Text("ada".to_string()),
            CellValue::Float(91.5),
            CellValue::blob(&[1, 2]),
        ]
    );
    assert_eq!(records.rows[2][2], CellValue::Null);
}

#[tokio::test]
async fn query_with_no_rows_keeps_column_names() {
    let harness = ready().await;
    let records =
        harness.host.query(&fixture_key(), "SELECT name FROM t1 WHERE id < 0").await.unwrap();
    assert_eq!(records.columns, vec!["name"]);
    assert!(records.rows.is_empty());
}

#[tokio::test]
async fn schema_mutation_is_rejected_and_tables_unchanged() {
    let harness = ready().await;
    let before = harness.host.tables(&fixture_key()).await.unwrap();
    for sql in [
        "CREATE TABLE t2 (x INTEGER)",
        "DROP TABLE t1",
        "ALTER TABLE t1 ADD COLUMN extra TEXT",
        "ATTACH DATABASE '/tmp/other.sqlite' AS other",
        "PRAGMA journal_mode = DELETE",
        "BEGIN",
    ] {
        let err = harness.host.query(&fixture_key(), sql).await.unwrap_err();
        assert!(matches!(err, NodeError::QueryRejected(_)), "{sql}: {err:?}");
        let err = harness.host.execute(&fixture_key(), sql).await.unwrap_err();
        assert!(matches!(err, NodeError::QueryRejected(_)), "{sql}: {err:?}");
    }
    let after = harness.host.tables(&fixture_key()).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn query_rejects_data_changes() {
    let harness = ready().await;
    let err = harness
        .host
        .query(&fixture_key(), "DELETE FROM t1")
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::QueryRejected(_)));
    let records = harness.host.query(&fixture_key(), "SELECT count(*) FROM t1").await.unwrap();
    assert_eq!(records.rows[0][0], CellValue::Integer(3));
}

#[tokio::test]
async fn query_rejects_multiple_statements() {
    let harness = ready().await;
    let err = harness
        .host
        .query(&fixture_key(), "SELECT 1; DROP TABLE t1")
        .await
        .unwrap_err();
    assert!(matches!(err, NodeError::QueryRejected(_)));
}

#[tokio::test]
async fn query_rejects_empty_text() {
    let harness = ready().await;
    let err = harness.host.query(&fixture_key(), "   ").await.unwrap_err();
    assert!(matches!(err, NodeError::QueryRejected(_)));
}

#[tokio::test]
async fn query_engine_error_is_execution_failed() {
    let harness = ready().await;
    let err = harness.host.query(&fixture_key(), "SELECT * FROM ghost").await.unwrap_err();
    assert!(matches!(err, NodeError::ExecutionFailed(_)));
}

#[tokio::test]
async fn runaway_query_is_interrupted() {
    let harness = Harness::with_limits(QueryLimits {
        timeout_ms: 50,
        max_rows: None,
    });
    harness.host.create(&fixture_key()).await.unwrap();
    let sql = "WITH RECURSIVE counter(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM counter) \
               SELECT count(*) FROM counter";
    let err = harness.host.query(&fixture_key(), sql).await.unwrap_err();
    assert_eq!(
        err,
        NodeError::QueryTimeout {
            timeout_ms: 50,
        }
    );
}

#[tokio::test]
async fn row_bound_is_enforced() {
    let harness = Harness::with_limits(QueryLimits {
        timeout_ms: 10_000,
        max_rows: Some(2),
    });
    harness.host.create(&fixture_key()).await.unwrap();
    let err = harness.host.query(&fixture_key(), "SELECT id FROM t1").await.unwrap_err();
    assert!(matches!(err, NodeError::LimitExceeded(_)));
    let records =
        harness.host.query(&fixture_key(), "SELECT id FROM t1 LIMIT 2").await.unwrap();
    assert_eq!(records.rows.len(), 2);
}

// ============================================================================
// SECTION: Execute
// ============================================================================

#[tokio::test]
async fn execute_changes_rows_and_reports_count() {
    let harness = ready().await;
    let changed = harness
        .host
        .execute(&fixture_key(), "UPDATE t1 SET score = 0 WHERE score IS NULL OR score < 50")
        .await
        .unwrap();
    assert_eq!(changed, 2);
    let records =
        harness.host.query(&fixture_key(), "SELECT count(*) FROM t1 WHERE score = 0").await.unwrap();
    assert_eq!(records.rows[0][0], CellValue::Integer(2));
}

#[tokio::test]
async fn execute_rejects_pure_reads() {
    let harness = ready().await;
    let err = harness.host.execute(&fixture_key(), "SELECT 1").await.unwrap_err();
    assert!(matches!(err, NodeError::QueryRejected(_)));
}

#[tokio::test]
async fn execute_rejects_returning_clause_without_writing() {
    let harness = ready().await;
    for sql in [
        "INSERT INTO t1 (name) VALUES ('dave') RETURNING id",
        "UPDATE t1 SET score = 1 RETURNING id",
        "DELETE FROM t1 WHERE id = 1 RETURNING name",
    ] {
        let err = harness.host.execute(&fixture_key(), sql).await.unwrap_err();
        assert!(matches!(err, NodeError::QueryRejected(_)), "{sql}: {err}");
    }
    let records = harness
        .host
        .query(&fixture_key(), "SELECT count(*) FROM t1 WHERE score = 1")
        .await
        .unwrap();
    assert_eq!(records.rows[0][0], CellValue::Integer(0));
    let records = harness.host.query(&fixture_key(), "SELECT count(*) FROM t1").await.unwrap();
    assert_eq!(records.rows[0][0], CellValue::Integer(3));
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

#[tokio::test]
async fn create_is_idempotent() {
    let harness = ready().await;
    let outcome = harness.host.create(&fixture_key()).await.unwrap();
    assert_eq!(outcome, MaterializeOutcome::AlreadyPresent);
    assert_eq!(harness.objects.fetch_count(), 1);
}

#[tokio::test]
async fn create_missing_object_is_materialization_failure() {
    let harness = Harness::new();
    let err = harness.host.create(&key("alice", "absent")).await.unwrap_err();
    assert!(matches!(err, NodeError::MaterializationFailed(_)));
}

#[tokio::test]
async fn delete_then_tables_is_not_found() {
    let harness = ready().await;
    harness.host.delete(&fixture_key()).await.unwrap();
    let err = harness.host.tables(&fixture_key()).await.unwrap_err();
    assert!(matches!(err, NodeError::NotFound(_)));
    let err = harness.host.delete(&fixture_key()).await.unwrap_err();
    assert!(matches!(err, NodeError::NotFound(_)));
}

#[tokio::test]
async fn size_matches_live_file() {
    let harness = ready().await;
    let size = harness.host.size(&fixture_key()).await.unwrap();
    assert_eq!(size, u64::try_from(fixture_bytes().len()).unwrap());
}

#[tokio::test]
async fn backup_uploads_consistent_snapshot() {
    let harness = ready().await;
    harness.host.execute(&fixture_key(), "DELETE FROM t1 WHERE id = 3").await.unwrap();

    let uploaded = harness.host.backup(&fixture_key()).await.unwrap();

    let bytes = harness.objects.get(&fixture_key()).unwrap();
    assert_eq!(uploaded, u64::try_from(bytes.len()).unwrap());
    let scratch = TempDir::new().unwrap();
    let path = scratch.path().join("restored.sqlite");
    std::fs::write(&path, &bytes).unwrap();
    let restored = Connection::open(&path).unwrap();
    let rows: i64 = restored.query_row("SELECT count(*) FROM t1", [], |row| row.get(0)).unwrap();
    assert_eq!(rows, 2);
}

#[tokio::test]
async fn backup_upload_failure_is_storage_failed() {
    let dir = TempDir::new().unwrap();
    let objects = MemoryObjectStore::new();
    objects.insert(&fixture_key(), fixture_bytes());
    let host = DatabaseHost::new(
        LocalStore::open(dir.path()).unwrap(),
        Arc::new(RejectingUploads::new(objects)) as Arc<dyn ObjectStore>,
        QueryLimits::default(),
    );
    host.create(&fixture_key()).await.unwrap();
    let err = host.backup(&fixture_key()).await.unwrap_err();
    assert!(matches!(err, NodeError::StorageFailed(_)));
}
