// crates/live-node-store-sqlite/src/handlers.rs
// ============================================================================
// Module: Operation Handlers
// Description: Introspection, query, execute, and snapshot handlers.
// Purpose: Run one operation against an already-materialized live file.
// Dependencies: live-node-core, rusqlite, tempfile
// ============================================================================

//! ## Overview
//! Handlers are synchronous and take the resolved live file path. The host
//! runs them on the blocking pool while holding the database's key lock.
//! Introspection handlers run fixed SQL on a defensive connection; user SQL
//! goes through the statement guard.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;

use live_node_core::CellValue;
use live_node_core::ColumnInfo;
use live_node_core::IndexColumn;
use live_node_core::IndexInfo;
use live_node_core::RecordSet;
use rusqlite::Connection;
use rusqlite::params;
use rusqlite::types::ValueRef;

use crate::error::SqliteStoreError;
use crate::guard::QueryLimits;
use crate::guard::StatementPolicy;
use crate::guard::classify_step_error;
use crate::guard::open_defensive;
use crate::guard::open_guarded;
use crate::guard::prepare_guarded;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Lists user objects of one type, excluding `SQLite` internals.
const LIST_OBJECTS_SQL: &str = "SELECT name FROM sqlite_master \
     WHERE type = ?1 AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' ORDER BY name";
/// Lists user indexes with their tables.
const LIST_INDEXES_SQL: &str = "SELECT name, tbl_name FROM sqlite_master \
     WHERE type = 'index' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' ORDER BY tbl_name, name";
/// Lists the key columns of one index.
const INDEX_COLUMNS_SQL: &str = "SELECT cid, name FROM pragma_index_info(?1) ORDER BY seqno";
/// Checks that a table or view exists.
const OBJECT_EXISTS_SQL: &str =
    "SELECT count(*) FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1";
/// Lists the columns of a table or view.
const TABLE_COLUMNS_SQL: &str =
    "SELECT cid, name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid";

// ============================================================================
// SECTION: Introspection
// ============================================================================

/// Lists user tables.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] when the catalog cannot be read.
pub fn list_tables(path: &Path) -> Result<Vec<String>, SqliteStoreError> {
    list_objects(&open_defensive(path)?, "table")
}

/// Lists views.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] when the catalog cannot be read.
pub fn list_views(path: &Path) -> Result<Vec<String>, SqliteStoreError> {
    list_objects(&open_defensive(path)?, "view")
}

/// Lists index descriptors. An empty list is a valid result.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] when the catalog cannot be read.
pub fn list_indexes(path: &Path) -> Result<Vec<IndexInfo>, SqliteStoreError> {
    let connection = open_defensive(path)?;
    let mut statement =
        connection.prepare(LIST_INDEXES_SQL).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let names = statement
        .query_map(params![], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let mut columns_statement = connection
        .prepare(INDEX_COLUMNS_SQL)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let mut indexes = Vec::with_capacity(names.len());
    for (name, table) in names {
        let columns = columns_statement
            .query_map(params![name], |row| {
                Ok(IndexColumn {
                    id: row.get(0)?,
                    name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                })
            })
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        indexes.push(IndexInfo {
            name,
            table,
            columns,
        });
    }
    Ok(indexes)
}

/// Lists the columns of a table or view, plus its primary-key columns.
///
/// # Errors
///
/// Returns [`SqliteStoreError::NotFound`] when no table or view has that
/// name.
pub fn list_columns(
    path: &Path,
    table: &str,
) -> Result<(Vec<ColumnInfo>, Vec<String>), SqliteStoreError> {
    let connection = open_defensive(path)?;
    let matches: i64 = connection
        .query_row(OBJECT_EXISTS_SQL, params![table], |row| row.get(0))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    if matches == 0 {
        return Err(SqliteStoreError::NotFound(format!(
            "table or view '{table}' does not exist"
        )));
    }
    let mut statement = connection
        .prepare(TABLE_COLUMNS_SQL)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let columns = statement
        .query_map(params![table], |row| {
            Ok(ColumnInfo {
                cid: row.get(0)?,
                name: row.get(1)?,
                data_type: row.get(2)?,
                not_null: row.get::<_, i64>(3)? != 0,
                default_value: row.get(4)?,
                pk: row.get(5)?,
            })
        })
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let mut key_columns: Vec<&ColumnInfo> = columns.iter().filter(|column| column.pk > 0).collect();
    key_columns.sort_by_key(|column| column.pk);
    let pk_columns = key_columns.into_iter().map(|column| column.name.clone()).collect();
    Ok((columns, pk_columns))
}

/// Lists user objects of one catalog type.
fn list_objects(connection: &Connection, kind: &str) -> Result<Vec<String>, SqliteStoreError> {
    let mut statement =
        connection.prepare(LIST_OBJECTS_SQL).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    statement
        .query_map(params![kind], |row| row.get(0))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?
        .collect::<Result<Vec<String>, _>>()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))
}

// ============================================================================
// SECTION: User SQL
// ============================================================================

/// Runs a read-only statement and returns its rows.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Rejected`] for statements outside the
/// read-only subset, [`SqliteStoreError::Interrupted`] at the deadline, and
/// [`SqliteStoreError::TooManyRows`] past the row bound.
pub fn run_query(path: &Path, sql: &str, limits: QueryLimits) -> Result<RecordSet, SqliteStoreError> {
    let connection = open_guarded(path, StatementPolicy::ReadOnly, limits)?;
    let mut statement = prepare_guarded(&connection, sql)?;
    if !statement.readonly() {
        return Err(SqliteStoreError::Rejected("statement is not read-only".to_string()));
    }
    let columns: Vec<String> =
        statement.column_names().into_iter().map(str::to_string).collect();
    let column_count = columns.len();
    let mut rows = statement.query(params![]).map_err(|err| classify_step_error(&err, limits))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next().map_err(|err| classify_step_error(&err, limits))? {
        if let Some(max_rows) = limits.max_rows
            && records.len() >= max_rows
        {
            return Err(SqliteStoreError::TooManyRows {
                max_rows,
            });
        }
        let mut cells = Vec::with_capacity(column_count);
        for index in 0 .. column_count {
            let value = row.get_ref(index).map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            cells.push(cell_value(value));
        }
        records.push(cells);
    }
    Ok(RecordSet {
        columns,
        rows: records,
    })
}

/// Runs a data-changing statement and returns the number of changed rows.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Rejected`] for statements outside the
/// data-change subset, for pure reads, and for statements returning rows
/// (`RETURNING`), before anything is stepped; and
/// [`SqliteStoreError::Interrupted`] at the deadline.
pub fn run_execute(path: &Path, sql: &str, limits: QueryLimits) -> Result<u64, SqliteStoreError> {
    let connection = open_guarded(path, StatementPolicy::DataChange, limits)?;
    let mut statement = prepare_guarded(&connection, sql)?;
    if statement.readonly() {
        return Err(SqliteStoreError::Rejected(
            "statement does not change data; use the query operation".to_string(),
        ));
    }
    if statement.column_count() > 0 {
        return Err(SqliteStoreError::Rejected(
            "statements returning rows are not accepted by execute".to_string(),
        ));
    }
    let changed = statement.execute(params![]).map_err(|err| classify_step_error(&err, limits))?;
    Ok(u64::try_from(changed).unwrap_or(u64::MAX))
}

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Produces a consistent, integrity-checked copy of the live file.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Io`] when scratch space is unavailable and
/// [`SqliteStoreError::Db`] when the snapshot fails its integrity check.
pub fn snapshot(path: &Path) -> Result<Vec<u8>, SqliteStoreError> {
    let scratch = tempfile::Builder::new()
        .prefix("live-node-backup-")
        .tempdir()
        .map_err(|err| SqliteStoreError::Io(err.to_string()))?;
    let target = scratch.path().join("snapshot.sqlite");
    let source = open_defensive(path)?;
    source
        .execute("VACUUM INTO ?1", params![target.to_string_lossy()])
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    drop(source);
    let copy = open_defensive(&target)?;
    let verdict: String = copy
        .query_row("PRAGMA integrity_check", params![], |row| row.get(0))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    drop(copy);
    if verdict != "ok" {
        return Err(SqliteStoreError::Db(format!("snapshot failed integrity check: {verdict}")));
    }
    std::fs::read(&target).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Converts an engine value into a wire cell.
fn cell_value(value: ValueRef<'_>) -> CellValue {
    match value {
        ValueRef::Null => CellValue::Null,
        ValueRef::Integer(value) => CellValue::Integer(value),
        ValueRef::Real(value) => CellValue::Float(value),
        ValueRef::Text(bytes) => CellValue::text(bytes),
        ValueRef::Blob(bytes) => CellValue::blob(bytes),
    }
}
