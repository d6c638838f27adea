// crates/live-node-store-sqlite/src/error.rs
// ============================================================================
// Module: SQLite Store Errors
// Description: Store-level error type and its mapping into the node taxonomy.
// Purpose: Keep engine and filesystem details out of the wire error kinds.
// Dependencies: live-node-core, thiserror
// ============================================================================

//! ## Overview
//! [`SqliteStoreError`] is what the layout, materializer, guard, and
//! handlers return. The host converts it into [`NodeError`] at the crate
//! boundary, choosing the kind the caller sees.

// ============================================================================
// SECTION: Imports
// ============================================================================

use live_node_core::NodeError;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// SQLite store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqliteStoreError {
    /// Local filesystem failure.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error on an allowed statement.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Database, table, or view is missing.
    #[error("{0}")]
    NotFound(String),
    /// Statement rejected by the guard.
    #[error("{0}")]
    Rejected(String),
    /// Statement interrupted at its deadline.
    #[error("statement interrupted after {timeout_ms} ms")]
    Interrupted {
        /// Configured deadline in milliseconds.
        timeout_ms: u64,
    },
    /// Result exceeded the configured row bound.
    #[error("result exceeds {max_rows} rows")]
    TooManyRows {
        /// Configured row bound.
        max_rows: usize,
    },
    /// Fetching the authoritative copy failed.
    #[error("{0}")]
    Fetch(String),
    /// Fetched bytes are not a usable database.
    #[error("{0}")]
    InvalidImage(String),
}

impl From<SqliteStoreError> for NodeError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::StorageFailed(message),
            SqliteStoreError::Db(message) => Self::ExecutionFailed(message),
            SqliteStoreError::NotFound(message) => Self::NotFound(message),
            SqliteStoreError::Rejected(message) => Self::QueryRejected(message),
            SqliteStoreError::Interrupted {
                timeout_ms,
            } => Self::QueryTimeout {
                timeout_ms,
            },
            SqliteStoreError::TooManyRows {
                max_rows,
            } => Self::LimitExceeded(format!("result exceeds {max_rows} rows")),
            SqliteStoreError::Fetch(message) | SqliteStoreError::InvalidImage(message) => {
                Self::MaterializationFailed(message)
            }
        }
    }
}
