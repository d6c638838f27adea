// crates/live-node-core/src/core/request.rs
// ============================================================================
// Module: Live Node Request Envelope
// Description: Inbound request envelope and operation catalogue.
// Purpose: Decode broker payloads into typed, validated requests.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The API tier publishes a JSON request naming the operation and the target
//! database. Decoding is split in two so the dispatcher can tell an
//! undecodable payload apart from a well-formed request naming an operation
//! this node does not serve: [`RequestEnvelope::decode`] accepts any
//! operation label, and [`RequestEnvelope::operation`] resolves it.
//!
//! Both the canonical field names and the legacy spellings (`dbowner`,
//! `dbname`, `data`) are accepted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::error::NodeError;
use crate::core::identifiers::DatabaseKey;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted request payload size in bytes.
pub const MAX_REQUEST_BYTES: usize = 4 * 1024 * 1024;

// ============================================================================
// SECTION: Operation
// ============================================================================

/// Operations a live node serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Materialize the database locally.
    Create,
    /// Remove the local database file.
    Delete,
    /// List the columns of a table or view.
    Columns,
    /// List index descriptors.
    Indexes,
    /// Run a read-only statement and return its rows.
    Query,
    /// List user tables.
    Tables,
    /// List views.
    Views,
    /// Run a data-modifying statement and return the changed row count.
    Execute,
    /// Report the size of the local file.
    Size,
    /// Upload a consistent snapshot to the object store.
    Backup,
}

impl Operation {
    /// Every operation in wire order.
    pub const ALL: [Self; 10] = [
        Self::Create,
        Self::Delete,
        Self::Columns,
        Self::Indexes,
        Self::Query,
        Self::Tables,
        Self::Views,
        Self::Execute,
        Self::Size,
        Self::Backup,
    ];

    /// Returns the wire label for the operation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Columns => "columns",
            Self::Indexes => "indexes",
            Self::Query => "query",
            Self::Tables => "tables",
            Self::Views => "views",
            Self::Execute => "execute",
            Self::Size => "size",
            Self::Backup => "backup",
        }
    }

    /// Resolves a wire label, returning `None` for unknown operations.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|operation| operation.as_str() == label)
    }
}

// ============================================================================
// SECTION: Request Envelope
// ============================================================================

/// Inbound request envelope.
///
/// # Invariants
/// - Immutable once decoded; the dispatcher never rewrites a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Operation label as sent by the caller.
    pub operation: String,
    /// Database owner.
    #[serde(default, alias = "dbowner")]
    pub db_owner: String,
    /// Database name.
    #[serde(default, alias = "dbname")]
    pub db_name: String,
    /// SQL text, or the table name for `columns`.
    #[serde(default, alias = "data")]
    pub query: String,
    /// Identity of the end user on whose behalf the request runs.
    #[serde(default)]
    pub requesting_user: String,
}

impl RequestEnvelope {
    /// Decodes a request from raw broker bytes.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Decode`] when the payload is oversized, not JSON,
    /// or lacks an operation label.
    pub fn decode(bytes: &[u8]) -> Result<Self, NodeError> {
        if bytes.len() > MAX_REQUEST_BYTES {
            return Err(NodeError::Decode(format!(
                "request payload exceeds {MAX_REQUEST_BYTES} bytes"
            )));
        }
        serde_json::from_slice(bytes).map_err(|err| NodeError::Decode(err.to_string()))
    }

    /// Resolves the operation label.
    #[must_use]
    pub fn operation(&self) -> Option<Operation> {
        Operation::from_label(&self.operation)
    }

    /// Returns the validated database key named by the request.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError::Decode`] when owner or name is not a valid
    /// identifier.
    pub fn database_key(&self) -> Result<DatabaseKey, NodeError> {
        DatabaseKey::new(self.db_owner.as_str(), self.db_name.as_str())
            .map_err(|err| NodeError::Decode(err.to_string()))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions and helpers are permitted."
    )]

    use super::Operation;
    use super::RequestEnvelope;
    use crate::core::error::NodeError;

    #[test]
    fn decode_accepts_legacy_field_names() {
        let payload = br#"{"operation":"columns","dbowner":"alice","dbname":"music","data":"tracks","requesting_user":"bob"}"#;
        let request = RequestEnvelope::decode(payload).unwrap();
        assert_eq!(request.operation(), Some(Operation::Columns));
        assert_eq!(request.db_owner, "alice");
        assert_eq!(request.db_name, "music");
        assert_eq!(request.query, "tracks");
        assert_eq!(request.requesting_user, "bob");
    }

    #[test]
    fn decode_keeps_unknown_operations_addressable() {
        let payload = br#"{"operation":"rowdata","db_owner":"alice","db_name":"music"}"#;
        let request = RequestEnvelope::decode(payload).unwrap();
        assert_eq!(request.operation(), None);
        assert!(request.database_key().is_ok());
    }

    #[test]
    fn decode_rejects_missing_operation() {
        let err = RequestEnvelope::decode(br#"{"db_owner":"alice"}"#).unwrap_err();
        assert!(matches!(err, NodeError::Decode(_)));
    }

    #[test]
    fn database_key_rejects_path_escape() {
        let request = RequestEnvelope::decode(
            br#"{"operation":"tables","db_owner":"..","db_name":"music"}"#,
        )
        .unwrap();
        assert!(matches!(request.database_key(), Err(NodeError::Decode(_))));
    }

    #[test]
    fn labels_round_trip_through_from_label() {
        for operation in Operation::ALL {
            assert_eq!(Operation::from_label(operation.as_str()), Some(operation));
        }
    }
}
