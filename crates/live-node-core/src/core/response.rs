// crates/live-node-core/src/core/response.rs
// ============================================================================
// Module: Live Node Response Envelope
// Description: Operation-specific response payloads and the reply envelope.
// Purpose: Serialize handler results into the JSON shapes callers expect.
// Dependencies: base64, serde, serde_json
// ============================================================================

//! ## Overview
//! A response is a flat JSON object: the node identity, the operation
//! payload fields (when the operation succeeded), an `error` string that is
//! empty on success, and an `error_code` kind label on failure. Correlation
//! metadata travels on the broker message properties, not in the body.

// ============================================================================
// SECTION: Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;
use serde::Serialize;

use crate::core::error::NodeError;
use crate::core::identifiers::NodeIdentity;

// ============================================================================
// SECTION: Result Values
// ============================================================================

/// A single result cell.
///
/// # Invariants
/// - Blob values are base64 (standard alphabet, padded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    /// SQL NULL.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// IEEE double.
    Float(f64),
    /// UTF-8 text (lossy for invalid sequences).
    Text(String),
    /// Base64-encoded blob.
    Blob(String),
}

impl CellValue {
    /// Builds a blob cell from raw bytes.
    #[must_use]
    pub fn blob(bytes: &[u8]) -> Self {
        Self::Blob(STANDARD.encode(bytes))
    }

    /// Builds a text cell from raw bytes, replacing invalid UTF-8.
    #[must_use]
    pub fn text(bytes: &[u8]) -> Self {
        Self::Text(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Rows produced by a statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    /// Result column names in statement order.
    pub columns: Vec<String>,
    /// Result rows; each row has one cell per column.
    pub rows: Vec<Vec<CellValue>>,
}

/// Column descriptor for a table or view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column ordinal.
    pub cid: i64,
    /// Column name.
    pub name: String,
    /// Declared type (may be empty).
    #[serde(rename = "type")]
    pub data_type: String,
    /// Whether the column is declared `NOT NULL`.
    pub not_null: bool,
    /// Default value expression, if any.
    pub default_value: Option<String>,
    /// 1-based primary-key position, 0 when not part of the key.
    pub pk: i64,
}

/// A column participating in an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexColumn {
    /// Column ordinal within the table.
    pub id: i64,
    /// Column name.
    pub name: String,
}

/// Index descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Indexed table.
    pub table: String,
    /// Indexed columns in key order.
    pub columns: Vec<IndexColumn>,
}

/// Result of a create request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateOutcome {
    /// The live file exists on this node.
    Success,
    /// Materialization failed.
    Failure,
}

// ============================================================================
// SECTION: Payloads
// ============================================================================

/// Operation-specific response payload, flattened into the envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    /// `create` outcome.
    Created {
        /// Success or failure label.
        result: CreateOutcome,
    },
    /// `columns` result.
    Columns {
        /// Column descriptors in ordinal order.
        columns: Vec<ColumnInfo>,
        /// Primary-key column names in key order.
        pk_columns: Vec<String>,
    },
    /// `indexes` result.
    Indexes {
        /// Index descriptors.
        indexes: Vec<IndexInfo>,
    },
    /// `tables` result.
    Tables {
        /// Table names, sorted.
        tables: Vec<String>,
    },
    /// `views` result.
    Views {
        /// View names, sorted.
        views: Vec<String>,
    },
    /// `query` result.
    Records {
        /// Statement output.
        results: RecordSet,
    },
    /// `execute` result.
    RowsChanged {
        /// Number of rows inserted, updated, or deleted.
        rows_changed: u64,
    },
    /// `size` result.
    Size {
        /// File size in bytes.
        size: u64,
    },
}

// ============================================================================
// SECTION: Envelope
// ============================================================================

/// Outbound response envelope.
///
/// # Invariants
/// - `error` is empty if and only if the operation succeeded.
/// - `error_code` is present if and only if `error` is non-empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseEnvelope {
    /// Node that produced the response.
    pub node: NodeIdentity,
    /// Operation payload; omitted on failure except for `create`.
    #[serde(flatten)]
    pub payload: Option<ResponsePayload>,
    /// Error message, empty on success.
    pub error: String,
    /// Stable error kind label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
}

impl ResponseEnvelope {
    /// Builds a success response.
    #[must_use]
    pub fn success(node: &NodeIdentity, payload: Option<ResponsePayload>) -> Self {
        Self {
            node: node.clone(),
            payload,
            error: String::new(),
            error_code: None,
        }
    }

    /// Builds a failure response.
    #[must_use]
    pub fn failure(node: &NodeIdentity, error: &NodeError) -> Self {
        Self {
            node: node.clone(),
            payload: None,
            error: error.to_string(),
            error_code: Some(error.kind()),
        }
    }

    /// Builds the response for a create request.
    #[must_use]
    pub fn created(node: &NodeIdentity, outcome: Result<(), &NodeError>) -> Self {
        match outcome {
            Ok(()) => Self::success(
                node,
                Some(ResponsePayload::Created {
                    result: CreateOutcome::Success,
                }),
            ),
            Err(error) => Self {
                payload: Some(ResponsePayload::Created {
                    result: CreateOutcome::Failure,
                }),
                ..Self::failure(node, error)
            },
        }
    }

    /// Returns true when the response reports success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }

    /// Serializes the envelope to JSON bytes.
    ///
    /// Falls back to a minimal `{node, error}` object if serialization fails
    /// so the caller always receives a reply.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|err| {
            let fallback = serde_json::json!({
                "node": self.node.as_str(),
                "error": format!("response serialization failed: {err}"),
                "error_code": "storage_failed",
            });
            fallback.to_string().into_bytes()
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
