// crates/live-node-core/src/core/error.rs
// ============================================================================
// Module: Live Node Error Taxonomy
// Description: Request-level error kinds reported back to callers.
// Purpose: Give every failure a stable kind label and a readable message.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every per-request failure becomes a [`NodeError`] and is sent back to the
//! caller as a populated `error` string plus a stable `error_code`. None of
//! these kinds terminate the consumer; only startup and broker connectivity
//! failures are fatal to the process.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Request-level error taxonomy.
///
/// # Invariants
/// - [`NodeError::kind`] labels are stable and part of the wire contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    /// Malformed request payload or identifiers.
    #[error("malformed request: {0}")]
    Decode(String),
    /// Object-store fetch or local write failed while materializing.
    #[error("materialization failed: {0}")]
    MaterializationFailed(String),
    /// Database, table, or view does not exist on this node.
    #[error("{0}")]
    NotFound(String),
    /// Statement falls outside the allowed subset.
    #[error("query rejected: {0}")]
    QueryRejected(String),
    /// Local filesystem failure.
    #[error("storage failure: {0}")]
    StorageFailed(String),
    /// Broker publish or acknowledge failure.
    #[error("broker error: {0}")]
    Broker(String),
    /// The engine failed an allowed statement.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    /// Statement exceeded the server-side deadline.
    #[error("query exceeded the {timeout_ms} ms execution limit")]
    QueryTimeout {
        /// Configured deadline in milliseconds.
        timeout_ms: u64,
    },
    /// A configured result or object bound was exceeded.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),
}

impl NodeError {
    /// Returns the stable wire label for the error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode_error",
            Self::MaterializationFailed(_) => "materialization_failed",
            Self::NotFound(_) => "not_found",
            Self::QueryRejected(_) => "query_rejected",
            Self::StorageFailed(_) => "storage_failed",
            Self::Broker(_) => "broker_error",
            Self::ExecutionFailed(_) => "execution_failed",
            Self::QueryTimeout {
                ..
            } => "query_timeout",
            Self::LimitExceeded(_) => "limit_exceeded",
        }
    }
}
