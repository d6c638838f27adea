// crates/live-node-store-sqlite/src/guard.rs
// ============================================================================
// Module: Statement Guard
// Description: Defensive connections and statement classification.
// Purpose: Reject statements outside the allowed subset before they run.
// Dependencies: rusqlite
// ============================================================================

//! ## Overview
//! User SQL runs on a connection opened with `SQLITE_DBCONFIG_DEFENSIVE` on,
//! untrusted schema, no URI filenames, and an authorizer installed before
//! the statement is prepared. The authorizer is consulted by `SQLite` during
//! compilation, so a denied statement fails at prepare time and is never
//! stepped; the file is untouched.
//!
//! Allowed subset:
//! - [`StatementPolicy::ReadOnly`]: `SELECT`, `WITH`, reads, scalar and
//!   aggregate functions except `load_extension`, and the introspection
//!   pragmas `table_info`, `table_xinfo`, `index_info`, `index_xinfo`,
//!   `index_list`, plus read-only `data_version` and `page_size`.
//! - [`StatementPolicy::DataChange`]: the above plus `INSERT`, `UPDATE`, and
//!   `DELETE`.
//!
//! Everything else, including schema changes, `ATTACH`, transactions, and
//! savepoints, is denied. Exactly one statement is accepted per request.
//! Execution is bounded by a progress-handler deadline.
//!
//! Security posture: SQL text is untrusted input.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::time::Duration;
use std::time::Instant;

use rusqlite::Connection;
use rusqlite::ErrorCode;
use rusqlite::OpenFlags;
use rusqlite::Statement;
use rusqlite::config::DbConfig;
use rusqlite::hooks::AuthAction;
use rusqlite::hooks::AuthContext;
use rusqlite::hooks::Authorization;

use crate::error::SqliteStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Virtual machine instructions between deadline checks.
const PROGRESS_CHECK_INTERVAL: i32 = 1_000;
/// Pragmas allowed with or without an argument.
const INTROSPECTION_PRAGMAS: [&str; 5] =
    ["table_info", "table_xinfo", "index_info", "index_xinfo", "index_list"];
/// Pragmas allowed only as reads.
const READ_ONLY_PRAGMAS: [&str; 2] = ["data_version", "page_size"];

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Statement subset a guarded connection accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementPolicy {
    /// Reads only.
    ReadOnly,
    /// Reads plus row-level data changes.
    DataChange,
}

/// Execution bounds applied to guarded statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryLimits {
    /// Statement deadline in milliseconds.
    pub timeout_ms: u64,
    /// Optional maximum number of result rows.
    pub max_rows: Option<usize>,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            max_rows: None,
        }
    }
}

/// Decides whether an action is permitted under `policy`.
#[must_use]
pub fn authorize(policy: StatementPolicy, action: &AuthAction<'_>) -> Authorization {
    match action {
        AuthAction::Select
        | AuthAction::Read {
            ..
        }
        | AuthAction::Recursive => Authorization::Allow,
        AuthAction::Function {
            function_name,
        } => {
            if function_name.eq_ignore_ascii_case("load_extension") {
                Authorization::Deny
            } else {
                Authorization::Allow
            }
        }
        AuthAction::Pragma {
            pragma_name,
            pragma_value,
        } => authorize_pragma(pragma_name, pragma_value.is_some()),
        AuthAction::Insert {
            ..
        }
        | AuthAction::Update {
            ..
        }
        | AuthAction::Delete {
            ..
        } if policy == StatementPolicy::DataChange => Authorization::Allow,
        _ => Authorization::Deny,
    }
}

/// Decides whether a pragma is permitted.
fn authorize_pragma(name: &str, has_value: bool) -> Authorization {
    let name = name.to_ascii_lowercase();
    if INTROSPECTION_PRAGMAS.contains(&name.as_str()) {
        return Authorization::Allow;
    }
    if !has_value && READ_ONLY_PRAGMAS.contains(&name.as_str()) {
        return Authorization::Allow;
    }
    Authorization::Deny
}

// ============================================================================
// SECTION: Connections
// ============================================================================

/// Opens an existing database with defensive settings and no authorizer.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] when the file cannot be opened.
pub fn open_defensive(path: &Path) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let connection = Connection::open_with_flags(path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .set_db_config(DbConfig::SQLITE_DBCONFIG_DEFENSIVE, true)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .set_db_config(DbConfig::SQLITE_DBCONFIG_TRUSTED_SCHEMA, false)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(connection)
}

/// Opens an existing database for user SQL under `policy`.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] when the file cannot be opened or the
/// authorizer or deadline cannot be installed.
pub fn open_guarded(
    path: &Path,
    policy: StatementPolicy,
    limits: QueryLimits,
) -> Result<Connection, SqliteStoreError> {
    let connection = open_defensive(path)?;
    let deadline = Instant::now() + Duration::from_millis(limits.timeout_ms);
    connection
        .progress_handler(PROGRESS_CHECK_INTERVAL, Some(move || Instant::now() >= deadline))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .authorizer(Some(move |context: AuthContext<'_>| authorize(policy, &context.action)))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(connection)
}

/// Prepares exactly one user statement.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Rejected`] for empty input, multiple
/// statements, or authorizer denials, and [`SqliteStoreError::Db`] for
/// other engine errors.
pub fn prepare_guarded<'conn>(
    connection: &'conn Connection,
    sql: &str,
) -> Result<Statement<'conn>, SqliteStoreError> {
    if sql.trim().is_empty() {
        return Err(SqliteStoreError::Rejected("statement is empty".to_string()));
    }
    connection.prepare(sql).map_err(classify_prepare_error)
}

// ============================================================================
// SECTION: Error Classification
// ============================================================================

/// Maps a prepare failure to a rejection or engine error.
fn classify_prepare_error(err: rusqlite::Error) -> SqliteStoreError {
    if matches!(err, rusqlite::Error::MultipleStatement) {
        return SqliteStoreError::Rejected("only a single statement is allowed".to_string());
    }
    if err.sqlite_error_code() == Some(ErrorCode::AuthorizationForStatementDenied) {
        return SqliteStoreError::Rejected(format!("statement not permitted: {err}"));
    }
    SqliteStoreError::Db(err.to_string())
}

/// Maps a step failure, recognizing deadline interrupts.
#[must_use]
pub fn classify_step_error(err: &rusqlite::Error, limits: QueryLimits) -> SqliteStoreError {
    if err.sqlite_error_code() == Some(ErrorCode::OperationInterrupted) {
        return SqliteStoreError::Interrupted {
            timeout_ms: limits.timeout_ms,
        };
    }
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
